//! Small value types shared across the workspace.

use std::fmt;

use crate::error::{VaultError, VaultResult};

/// Length of a client UID in bytes (a UUID).
pub const UID_LEN: usize = 16;

/// The 16-byte client identifier registered with the escrow server and
/// embedded in the vault metadata record.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Uid([u8; UID_LEN]);

impl Uid {
    /// Parse a UID from its hex representation.  Dashes are accepted so
    /// a canonical UUID string can be pasted as-is; anything that does
    /// not decode to exactly 16 bytes is rejected.
    pub fn from_hex(s: &str) -> VaultResult<Self> {
        let compact: String = s.trim().chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|_| VaultError::BadUid)?;
        let raw: [u8; UID_LEN] = bytes.try_into().map_err(|_| VaultError::BadUid)?;
        Ok(Self(raw))
    }

    pub fn from_bytes(raw: [u8; UID_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; UID_LEN] {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({self})")
    }
}

/// Vault behaviour flags, stored as a single byte in the metadata
/// record.  Unknown bits are rejected when a record is opened, not when
/// it is written.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct VaultFlags(u8);

impl VaultFlags {
    /// Passphrase-only vault: never contact the escrow server; the
    /// KDF-derived key is used directly as the effective key.
    pub const NOAUTH: VaultFlags = VaultFlags(0x01);

    const KNOWN: u8 = 0x01;

    pub const fn empty() -> Self {
        VaultFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Rebuild flags from a stored byte, rejecting unknown bits.
    pub fn from_bits(bits: u8) -> Option<Self> {
        ((bits & !Self::KNOWN) == 0).then_some(VaultFlags(bits))
    }

    pub const fn contains(self, other: VaultFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for VaultFlags {
    type Output = VaultFlags;

    fn bitor(self, rhs: VaultFlags) -> VaultFlags {
        VaultFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for VaultFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::NOAUTH) {
            write!(f, "VaultFlags(NOAUTH)")
        } else {
            write!(f, "VaultFlags({:#04x})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_from_plain_hex() {
        let uid = Uid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(uid.to_string(), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn test_uid_accepts_uuid_dashes() {
        let dashed = Uid::from_hex("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let plain = Uid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(dashed, plain);
    }

    #[test]
    fn test_uid_rejects_non_hex() {
        assert!(matches!(Uid::from_hex("not-hex"), Err(VaultError::BadUid)));
    }

    #[test]
    fn test_uid_rejects_wrong_length() {
        assert!(matches!(Uid::from_hex("00112233"), Err(VaultError::BadUid)));
        assert!(matches!(
            Uid::from_hex("00112233445566778899aabbccddeeff00"),
            Err(VaultError::BadUid)
        ));
    }

    #[test]
    fn test_flags_roundtrip() {
        let f = VaultFlags::NOAUTH;
        assert_eq!(VaultFlags::from_bits(f.bits()), Some(f));
        assert!(f.contains(VaultFlags::NOAUTH));
        assert!(!VaultFlags::empty().contains(VaultFlags::NOAUTH));
    }

    #[test]
    fn test_flags_reject_unknown_bits() {
        assert_eq!(VaultFlags::from_bits(0x80), None);
        assert_eq!(VaultFlags::from_bits(0x03), None);
    }
}
