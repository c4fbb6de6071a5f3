//! AES-SIV filename obfuscation.
//!
//! File names inside the vault directory are encrypted deterministically
//! (same name + key = same on-disk name) so path resolution stays a
//! plain directory lookup.  This hides names from a casual observer but
//! is deliberately not a confidentiality claim: sizes, counts and
//! timestamps remain visible.
//!
//! The name key is derived from the effective key K_e with an
//! HKDF-SHA256 domain separation, so file names and file contents never
//! share key material directly.

use aes_siv::aead::{Aead, KeyInit};
use aes_siv::{Aes256SivAead, Nonce};
use hkdf::Hkdf;
use redoubt_core::{VaultError, VaultResult};
use redoubt_crypto::KEY_SIZE;
use sha2::Sha256;
use zeroize::Zeroizing;

/// AES-256-SIV wants a 64-byte key (two 32-byte sub-keys).
pub const NAME_KEY_LEN: usize = 64;

/// Derive the name-encryption key from K_e.
pub fn name_key(ke: &[u8; KEY_SIZE]) -> VaultResult<Zeroizing<[u8; NAME_KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ke);
    let mut okm = Zeroizing::new([0u8; NAME_KEY_LEN]);
    hk.expand(b"redoubt-names", okm.as_mut())
        .map_err(|e| VaultError::Kdf(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// Encrypt one path component.  Returns the hex form used on disk.
pub fn encrypt_name(key: &[u8; NAME_KEY_LEN], plain: &str) -> VaultResult<String> {
    let cipher = Aes256SivAead::new(key.into());
    // Zero nonce: determinism is the point of SIV here.
    let nonce = Nonce::default();

    let ct = cipher
        .encrypt(&nonce, plain.as_bytes())
        .map_err(|_| VaultError::BadLength("file name"))?;
    Ok(hex::encode(ct))
}

/// Decrypt an on-disk name back to the cleartext component.
pub fn decrypt_name(key: &[u8; NAME_KEY_LEN], obfuscated: &str) -> VaultResult<String> {
    let ct = hex::decode(obfuscated).map_err(|_| VaultError::AuthenticationFailed)?;

    let cipher = Aes256SivAead::new(key.into());
    let nonce = Nonce::default();

    let plain = cipher
        .decrypt(&nonce, ct.as_ref())
        .map_err(|_| VaultError::AuthenticationFailed)?;
    String::from_utf8(plain).map_err(|_| VaultError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Zeroizing<[u8; NAME_KEY_LEN]> {
        name_key(&[0x55u8; KEY_SIZE]).unwrap()
    }

    #[test]
    fn test_name_roundtrip() {
        let key = test_key();
        let enc = encrypt_name(&key, "notes.txt").unwrap();
        assert_eq!(decrypt_name(&key, &enc).unwrap(), "notes.txt");
    }

    #[test]
    fn test_deterministic() {
        let key = test_key();
        assert_eq!(
            encrypt_name(&key, "report.pdf").unwrap(),
            encrypt_name(&key, "report.pdf").unwrap()
        );
    }

    #[test]
    fn test_on_disk_form_is_hex() {
        let key = test_key();
        let enc = encrypt_name(&key, "a").unwrap();
        assert!(enc.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_keys_different_names() {
        let k1 = name_key(&[0x01u8; KEY_SIZE]).unwrap();
        let k2 = name_key(&[0x02u8; KEY_SIZE]).unwrap();
        assert_ne!(
            encrypt_name(&k1, "same.txt").unwrap(),
            encrypt_name(&k2, "same.txt").unwrap()
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let k1 = name_key(&[0x01u8; KEY_SIZE]).unwrap();
        let k2 = name_key(&[0x02u8; KEY_SIZE]).unwrap();
        let enc = encrypt_name(&k1, "secret.txt").unwrap();
        assert!(decrypt_name(&k2, &enc).is_err());
    }

    #[test]
    fn test_garbage_on_disk_name_rejected() {
        let key = test_key();
        assert!(decrypt_name(&key, "zz-not-hex").is_err());
        assert!(decrypt_name(&key, "00aabb").is_err());
    }
}
