//! The crypto context: one cipher engine, one IV, at most one key.
//!
//! A context is created per vault handle.  During init/open it first
//! carries the passphrase-derived K_p (enough to wrap or unwrap the
//! envelope), then the effective key K_e.  `encrypt`/`decrypt` are
//! one-shot over whole buffers; AEAD output carries the tag appended to
//! the ciphertext and the caller detaches it for the on-disk layout.

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chacha20::cipher::StreamCipher;
use chacha20::ChaCha20;
use chacha20poly1305::ChaCha20Poly1305;
use redoubt_core::{VaultError, VaultResult};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::cipher::CipherKind;
use crate::kdf::{self, EffectiveKey, KdfParams};
use crate::{fill_random, KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Cipher engine + IV + active key for one vault handle.  The IV
/// buffer and the key both zeroize when the context is dropped, so the
/// destroy step of the lifecycle is the drop itself.
pub struct CryptoCtx {
    kind: CipherKind,
    iv: Zeroizing<Vec<u8>>,
    key: Option<EffectiveKey>,
}

impl CryptoCtx {
    pub fn new(kind: CipherKind) -> Self {
        Self {
            kind,
            iv: Zeroizing::new(Vec::new()),
            key: None,
        }
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    /// Draw a fresh random IV of the cipher's required length and
    /// install it.
    pub fn gen_iv(&mut self) -> VaultResult<()> {
        let mut iv = vec![0u8; self.kind.iv_len()];
        fill_random(&mut iv)?;
        self.iv = Zeroizing::new(iv);
        Ok(())
    }

    pub fn set_iv(&mut self, iv: &[u8]) -> VaultResult<()> {
        if iv.len() != self.kind.iv_len() {
            return Err(VaultError::BadLength("initialization vector"));
        }
        self.iv = Zeroizing::new(iv.to_vec());
        Ok(())
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Derive K_p from the passphrase using the serialized parameter
    /// block and install it as the active key.
    pub fn set_passphrase_key(
        &mut self,
        passphrase: &SecretString,
        params_blob: &[u8],
    ) -> VaultResult<()> {
        let params = KdfParams::from_bytes(params_blob)?;
        self.key = Some(kdf::derive_key(passphrase, &params)?);
        Ok(())
    }

    /// Install a key directly (recovery path and tests).  The previous
    /// key, if any, is dropped and therefore zeroized.
    pub fn set_key(&mut self, bytes: &[u8]) -> VaultResult<()> {
        let raw: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| VaultError::BadKey {
            got: bytes.len(),
            need: self.kind.key_len(),
        })?;
        self.key = Some(EffectiveKey::from_bytes(raw));
        Ok(())
    }

    /// Read-only view of the active key, for the HMAC routine and the
    /// name-key derivation.
    pub fn key(&self) -> VaultResult<&[u8; KEY_SIZE]> {
        self.active_key().map(EffectiveKey::as_bytes)
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// One-shot encryption of a whole buffer with the active key and
    /// installed IV.  AEAD ciphers return ciphertext with the tag
    /// appended; CBC pads with PKCS#7; ChaCha20 is length-preserving.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> VaultResult<Vec<u8>> {
        let key = self.active_key()?;
        match self.kind {
            CipherKind::Aes256Cbc => {
                let enc = Aes256CbcEnc::new_from_slices(key.as_bytes(), &self.iv)
                    .map_err(|_| VaultError::BadLength("initialization vector"))?;
                Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
            CipherKind::Chacha20 => {
                let mut cipher = ChaCha20::new_from_slices(key.as_bytes(), &self.iv)
                    .map_err(|_| VaultError::BadLength("initialization vector"))?;
                let mut buf = plaintext.to_vec();
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
            CipherKind::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.as_bytes().into());
                cipher
                    .encrypt(
                        Nonce::from_slice(&self.iv),
                        Payload {
                            msg: plaintext,
                            aad,
                        },
                    )
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
            CipherKind::Chacha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
                cipher
                    .encrypt(
                        chacha20poly1305::Nonce::from_slice(&self.iv),
                        Payload {
                            msg: plaintext,
                            aad,
                        },
                    )
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
        }
    }

    /// Inverse of [`encrypt`](Self::encrypt).  AEAD tag or CBC padding
    /// failures surface as `AuthenticationFailed`; the caller cannot
    /// tell a wrong key from corrupted data, and neither can we.
    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> VaultResult<Vec<u8>> {
        let key = self.active_key()?;
        match self.kind {
            CipherKind::Aes256Cbc => {
                let dec = Aes256CbcDec::new_from_slices(key.as_bytes(), &self.iv)
                    .map_err(|_| VaultError::BadLength("initialization vector"))?;
                dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
            CipherKind::Chacha20 => {
                let mut cipher = ChaCha20::new_from_slices(key.as_bytes(), &self.iv)
                    .map_err(|_| VaultError::BadLength("initialization vector"))?;
                let mut buf = ciphertext.to_vec();
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
            CipherKind::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.as_bytes().into());
                cipher
                    .decrypt(
                        Nonce::from_slice(&self.iv),
                        Payload {
                            msg: ciphertext,
                            aad,
                        },
                    )
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
            CipherKind::Chacha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
                cipher
                    .decrypt(
                        chacha20poly1305::Nonce::from_slice(&self.iv),
                        Payload {
                            msg: ciphertext,
                            aad,
                        },
                    )
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
        }
    }

    fn active_key(&self) -> VaultResult<&EffectiveKey> {
        self.key
            .as_ref()
            .ok_or_else(|| VaultError::Kdf("no key installed in crypto context".into()))
    }
}

impl std::fmt::Debug for CryptoCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoCtx")
            .field("kind", &self.kind)
            .field("iv_len", &self.iv.len())
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
