//! Cipher selection.
//!
//! The cipher byte in the metadata record is the only place an
//! algorithm choice is persisted; everything else (IV length, tag
//! length, AEAD-ness) derives from it.

use redoubt_core::{VaultError, VaultResult};

use crate::{KEY_SIZE, TAG_SIZE};

/// The symmetric ciphers a vault can be created with.  The discriminant
/// is the on-disk byte; unknown bytes are rejected when a record is
/// opened, never silently remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CipherKind {
    Aes256Cbc = 1,
    Chacha20 = 2,
    Aes256Gcm = 3,
    Chacha20Poly1305 = 4,
}

impl CipherKind {
    /// Default cipher for new vaults.
    pub const PRIMARY: CipherKind = CipherKind::Aes256Cbc;

    pub fn from_name(name: &str) -> VaultResult<Self> {
        match name {
            "aes256-cbc" => Ok(CipherKind::Aes256Cbc),
            "chacha20" => Ok(CipherKind::Chacha20),
            "aes256-gcm" => Ok(CipherKind::Aes256Gcm),
            "chacha20-poly1305" => Ok(CipherKind::Chacha20Poly1305),
            other => Err(VaultError::UnsupportedCipher(other.to_string())),
        }
    }

    pub fn from_code(code: u8) -> VaultResult<Self> {
        match code {
            1 => Ok(CipherKind::Aes256Cbc),
            2 => Ok(CipherKind::Chacha20),
            3 => Ok(CipherKind::Aes256Gcm),
            4 => Ok(CipherKind::Chacha20Poly1305),
            other => Err(VaultError::UnsupportedCipher(format!("{other:#04x}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes256Cbc => "aes256-cbc",
            CipherKind::Chacha20 => "chacha20",
            CipherKind::Aes256Gcm => "aes256-gcm",
            CipherKind::Chacha20Poly1305 => "chacha20-poly1305",
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn key_len(self) -> usize {
        KEY_SIZE
    }

    pub fn iv_len(self) -> usize {
        match self {
            CipherKind::Aes256Cbc => 16,
            // IETF nonce for the ChaCha20 family, 96-bit GCM nonce.
            CipherKind::Chacha20 | CipherKind::Aes256Gcm | CipherKind::Chacha20Poly1305 => 12,
        }
    }

    /// AEAD tag length, or `None` for ciphers that rely on the external
    /// HMAC-SHA3-256 for integrity.
    pub fn tag_len(self) -> Option<usize> {
        match self {
            CipherKind::Aes256Cbc | CipherKind::Chacha20 => None,
            CipherKind::Aes256Gcm | CipherKind::Chacha20Poly1305 => Some(TAG_SIZE),
        }
    }

    pub fn is_aead(self) -> bool {
        self.tag_len().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CipherKind; 4] = [
        CipherKind::Aes256Cbc,
        CipherKind::Chacha20,
        CipherKind::Aes256Gcm,
        CipherKind::Chacha20Poly1305,
    ];

    #[test]
    fn test_name_code_roundtrip() {
        for kind in ALL {
            assert_eq!(CipherKind::from_name(kind.name()).unwrap(), kind);
            assert_eq!(CipherKind::from_code(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!(matches!(
            CipherKind::from_name("rot13"),
            Err(VaultError::UnsupportedCipher(_))
        ));
    }

    #[test]
    fn test_unknown_code_rejected() {
        for code in [0u8, 5, 0xff] {
            assert!(matches!(
                CipherKind::from_code(code),
                Err(VaultError::UnsupportedCipher(_))
            ));
        }
    }

    #[test]
    fn test_aead_tag_lengths() {
        assert_eq!(CipherKind::Aes256Cbc.tag_len(), None);
        assert_eq!(CipherKind::Chacha20.tag_len(), None);
        assert_eq!(CipherKind::Aes256Gcm.tag_len(), Some(16));
        assert_eq!(CipherKind::Chacha20Poly1305.tag_len(), Some(16));
    }
}
