//! HMAC-SHA3-256 over on-disk records.
//!
//! The metadata HMAC is keyed by the effective key K_e, never by the
//! passphrase-derived K_p: verifying it proves possession of the
//! envelope key, which is what chains the server's answer to the local
//! record.

use hmac::{Hmac, Mac};
use redoubt_core::{VaultError, VaultResult};
use sha3::Sha3_256;
use subtle::ConstantTimeEq;

use crate::{HMAC_SIZE, KEY_SIZE};

type HmacSha3 = Hmac<Sha3_256>;

pub fn compute(key: &[u8; KEY_SIZE], data: &[u8]) -> VaultResult<[u8; HMAC_SIZE]> {
    let mut mac = HmacSha3::new_from_slice(key)
        .map_err(|e| VaultError::Kdf(format!("HMAC key rejected: {e}")))?;
    mac.update(data);

    let mut out = [0u8; HMAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Constant-time comparison of the stored tag against a fresh
/// computation.  A mismatch is reported as `AuthenticationFailed`
/// without attempting to diagnose whether the key or the data is wrong.
pub fn verify(key: &[u8; KEY_SIZE], data: &[u8], stored: &[u8]) -> VaultResult<()> {
    let computed = compute(key, data)?;
    if bool::from(computed.as_slice().ct_eq(stored)) {
        Ok(())
    } else {
        Err(VaultError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_deterministic() {
        let key = [0x11u8; KEY_SIZE];
        let a = compute(&key, b"payload").unwrap();
        let b = compute(&key, b"payload").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_verify_accepts_valid_tag() {
        let key = [0x22u8; KEY_SIZE];
        let tag = compute(&key, b"record bytes").unwrap();
        assert!(verify(&key, b"record bytes", &tag).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let tag = compute(&[0x22u8; KEY_SIZE], b"record bytes").unwrap();
        assert!(matches!(
            verify(&[0x23u8; KEY_SIZE], b"record bytes", &tag),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_verify_rejects_flipped_tag_byte() {
        let key = [0x22u8; KEY_SIZE];
        let mut tag = compute(&key, b"record bytes").unwrap();
        tag[HMAC_SIZE - 1] ^= 0x01;
        assert!(verify(&key, b"record bytes", &tag).is_err());
    }

    #[test]
    fn test_verify_rejects_truncated_tag() {
        let key = [0x22u8; KEY_SIZE];
        let tag = compute(&key, b"record bytes").unwrap();
        assert!(verify(&key, b"record bytes", &tag[..HMAC_SIZE - 1]).is_err());
    }
}
