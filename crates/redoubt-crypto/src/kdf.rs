//! Key derivation: scrypt passphrase → K_p.
//!
//! The cost parameters and salt travel inside the vault metadata record
//! as an opaque blob, so a vault can always re-derive the same key even
//! after the defaults change.  Consumers outside this crate must treat
//! the blob as opaque bytes.

use redoubt_core::config::KdfTuning;
use redoubt_core::{VaultError, VaultResult};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{fill_random, KEY_SIZE};

/// Parameter-block format version.
const PARAMS_VER: u8 = 1;

/// Salt length in bytes.
const SALT_LEN: usize = 16;

/// Serialized size: ver, log_n, r (BE), p (BE), salt.
const PARAMS_LEN: usize = 1 + 1 + 4 + 4 + SALT_LEN;

/// A 256-bit key installed in a crypto context: either the
/// passphrase-derived K_p or the effective data key K_e.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct EffectiveKey {
    bytes: [u8; KEY_SIZE],
}

impl EffectiveKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EffectiveKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EffectiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// scrypt cost parameters plus the random salt, as embedded in the
/// metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    log_n: u8,
    r: u32,
    p: u32,
    salt: [u8; SALT_LEN],
}

impl KdfParams {
    /// Fresh parameters with a newly drawn salt.
    pub fn generate(tuning: &KdfTuning) -> VaultResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        Ok(Self {
            log_n: tuning.log_n,
            r: tuning.r,
            p: tuning.p,
            salt,
        })
    }

    /// Serialize for the metadata record.  The result always fits the
    /// one-byte `kp_len` field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PARAMS_LEN);
        out.push(PARAMS_VER);
        out.push(self.log_n);
        out.extend_from_slice(&self.r.to_be_bytes());
        out.extend_from_slice(&self.p.to_be_bytes());
        out.extend_from_slice(&self.salt);
        out
    }

    pub fn from_bytes(blob: &[u8]) -> VaultResult<Self> {
        if blob.len() != PARAMS_LEN {
            return Err(VaultError::Kdf(format!(
                "parameter block has {} bytes, expected {PARAMS_LEN}",
                blob.len()
            )));
        }
        if blob[0] != PARAMS_VER {
            return Err(VaultError::Kdf(format!(
                "unknown parameter block version {}",
                blob[0]
            )));
        }
        let r = u32::from_be_bytes([blob[2], blob[3], blob[4], blob[5]]);
        let p = u32::from_be_bytes([blob[6], blob[7], blob[8], blob[9]]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&blob[10..10 + SALT_LEN]);
        Ok(Self {
            log_n: blob[1],
            r,
            p,
            salt,
        })
    }
}

/// Run scrypt over the passphrase with the given parameters.
pub fn derive_key(passphrase: &SecretString, params: &KdfParams) -> VaultResult<EffectiveKey> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, KEY_SIZE)
        .map_err(|e| VaultError::Kdf(format!("invalid scrypt parameters: {e}")))?;

    let mut key = [0u8; KEY_SIZE];
    scrypt::scrypt(
        passphrase.expose_secret().as_bytes(),
        &params.salt,
        &scrypt_params,
        &mut key,
    )
    .map_err(|e| {
        key.zeroize();
        VaultError::Kdf(format!("scrypt failed: {e}"))
    })?;

    Ok(EffectiveKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> KdfParams {
        KdfParams {
            log_n: 10,
            r: 8,
            p: 1,
            salt: [7u8; SALT_LEN],
        }
    }

    #[test]
    fn test_kdf_deterministic() {
        let pass = SecretString::from("test-passphrase");
        let params = test_params();

        let k1 = derive_key(&pass, &params).unwrap();
        let k2 = derive_key(&pass, &params).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let params = test_params();

        let k1 = derive_key(&SecretString::from("passphrase-a"), &params).unwrap();
        let k2 = derive_key(&SecretString::from("passphrase-b"), &params).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_kdf_different_salts() {
        let pass = SecretString::from("same-passphrase");
        let mut a = test_params();
        let mut b = test_params();
        a.salt = [1u8; SALT_LEN];
        b.salt = [2u8; SALT_LEN];

        let k1 = derive_key(&pass, &a).unwrap();
        let k2 = derive_key(&pass, &b).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_params_serialization_roundtrip() {
        let params = KdfParams::generate(&KdfTuning::fast()).unwrap();
        let blob = params.to_bytes();

        assert!(blob.len() <= u8::MAX as usize, "must fit the kp_len byte");
        assert_eq!(KdfParams::from_bytes(&blob).unwrap(), params);
    }

    #[test]
    fn test_params_reject_truncated_blob() {
        let blob = test_params().to_bytes();
        assert!(KdfParams::from_bytes(&blob[..blob.len() - 1]).is_err());
    }

    #[test]
    fn test_params_reject_unknown_version() {
        let mut blob = test_params().to_bytes();
        blob[0] = 9;
        assert!(matches!(
            KdfParams::from_bytes(&blob),
            Err(VaultError::Kdf(_))
        ));
    }

    #[test]
    fn test_effective_key_debug_redacted() {
        let key = EffectiveKey::from_bytes([0xAA; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("170"), "no key bytes in Debug output");
    }
}
