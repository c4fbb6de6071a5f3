//! redoubt-crypto: symmetric primitives for the redoubt secret store.
//!
//! Key material and how it flows:
//! ```text
//! passphrase --scrypt(params from metadata)--> K_p
//! K_p --envelope-wraps--> K_e  (K_s = enc(K_e, K_p), held by the server)
//! K_e --keys--> file-object encryption, metadata HMAC-SHA3-256
//! ```
//!
//! A [`CryptoCtx`] holds the cipher engine, the IV and at most one
//! active key at a time.  Whichever of `set_passphrase_key` / `set_key`
//! ran last owns the slot.  All key-carrying buffers are zeroized on
//! drop and on every error path.

pub mod cipher;
pub mod context;
pub mod kdf;
pub mod mac;

pub use cipher::CipherKind;
pub use context::CryptoCtx;
pub use kdf::{derive_key, EffectiveKey, KdfParams};

use rand::rngs::OsRng;
use rand::RngCore;
use redoubt_core::{VaultError, VaultResult};

/// Size of an effective or passphrase-derived key in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// Size of the metadata/file-object HMAC-SHA3-256 tag.
pub const HMAC_SIZE: usize = 32;

/// Size of an AEAD authentication tag (GCM and Poly1305).
pub const TAG_SIZE: usize = 16;

/// Fill a buffer from the operating system RNG.
pub fn fill_random(buf: &mut [u8]) -> VaultResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VaultError::Rng(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_random_varies() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        fill_random(&mut a).unwrap();
        fill_random(&mut b).unwrap();
        assert_ne!(a, b, "two OS RNG draws must differ");
    }
}
