//! Encrypted file objects.
//!
//! Each payload file inside the vault carries its own framing:
//!
//! ```text
//! +--------------------------------------+
//! | ver | reserved | hmac_len (2, BE)    |
//! | edata_len (8, BE)                    |
//! | zero padding to 64 bytes             |
//! +--------------------------------------+
//! | ciphertext (edata_len)               |
//! +--------------------------------------+
//! | HMAC-SHA3-256 or AEAD tag (hmac_len) |
//! +--------------------------------------+
//! ```
//!
//! AEAD ciphers authenticate the header as associated data and store
//! the 16-byte tag; the others store a 32-byte HMAC-SHA3-256 over
//! header and ciphertext, keyed by K_e.  Whole objects are sealed and
//! unsealed in one shot; streaming is a concern of the filesystem
//! front-end.

use std::fs;
use std::io::Write;

use redoubt_core::{VaultError, VaultResult};
use redoubt_crypto::{mac, CipherKind, CryptoCtx, HMAC_SIZE};
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::vault::Vault;

pub const FILEOBJ_VER: u8 = 1;

/// Aligned header size; the fixed fields occupy 12 bytes.
pub const FILEOBJ_HDR_LEN: usize = 64;

const OFF_VER: usize = 0;
const OFF_HMAC_LEN: usize = 2;
const OFF_EDATA_LEN: usize = 4;

fn encode_header(hmac_len: u16, edata_len: u64) -> [u8; FILEOBJ_HDR_LEN] {
    let mut hdr = [0u8; FILEOBJ_HDR_LEN];
    hdr[OFF_VER] = FILEOBJ_VER;
    hdr[OFF_HMAC_LEN..OFF_HMAC_LEN + 2].copy_from_slice(&hmac_len.to_be_bytes());
    hdr[OFF_EDATA_LEN..OFF_EDATA_LEN + 8].copy_from_slice(&edata_len.to_be_bytes());
    hdr
}

fn parse_header(raw: &[u8]) -> VaultResult<(usize, usize)> {
    if raw.len() < FILEOBJ_HDR_LEN {
        return Err(VaultError::CorruptMetadata);
    }
    if raw[OFF_VER] != FILEOBJ_VER {
        return Err(VaultError::IncompatibleVersion(raw[OFF_VER]));
    }

    let hmac_len = u16::from_be_bytes([raw[OFF_HMAC_LEN], raw[OFF_HMAC_LEN + 1]]) as usize;
    let edata_len = u64::from_be_bytes(
        raw[OFF_EDATA_LEN..OFF_EDATA_LEN + 8]
            .try_into()
            .map_err(|_| VaultError::CorruptMetadata)?,
    );
    let edata_len = usize::try_from(edata_len).map_err(|_| VaultError::CorruptMetadata)?;

    if raw.len() != FILEOBJ_HDR_LEN + edata_len + hmac_len {
        return Err(VaultError::CorruptMetadata);
    }
    Ok((hmac_len, edata_len))
}

/// Trailer length for the context's cipher: AEAD tag or HMAC.
fn trailer_len(ctx: &CryptoCtx) -> usize {
    ctx.kind().tag_len().unwrap_or(HMAC_SIZE)
}

/// Ciphertext length this cipher will produce for a plaintext, with
/// the AEAD tag already detached.
fn sealed_data_len(ctx: &CryptoCtx, pt_len: usize) -> usize {
    match ctx.kind().tag_len() {
        // Tag is split off into the trailer.
        Some(_) => pt_len,
        None if ctx.kind() == CipherKind::Aes256Cbc => (pt_len / 16 + 1) * 16,
        None => pt_len,
    }
}

/// Produce the full on-disk representation of a payload.
pub fn seal(ctx: &CryptoCtx, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let tlen = trailer_len(ctx);
    let edata_len = sealed_data_len(ctx, plaintext.len());
    let hdr = encode_header(tlen as u16, edata_len as u64);

    let mut out = Vec::with_capacity(FILEOBJ_HDR_LEN + edata_len + tlen);
    out.extend_from_slice(&hdr);

    if ctx.kind().is_aead() {
        // Ciphertext arrives with the tag appended; the header rides
        // along as associated data.
        let ct = ctx.encrypt(plaintext, &hdr)?;
        debug_assert_eq!(ct.len(), edata_len + tlen);
        out.extend_from_slice(&ct);
    } else {
        let ct = ctx.encrypt(plaintext, &[])?;
        debug_assert_eq!(ct.len(), edata_len);
        out.extend_from_slice(&ct);
        let tag = mac::compute(ctx.key()?, &out)?;
        out.extend_from_slice(&tag);
    }
    Ok(out)
}

/// Validate, authenticate and decrypt an on-disk payload.
pub fn unseal(ctx: &CryptoCtx, raw: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
    let (hmac_len, edata_len) = parse_header(raw)?;
    if hmac_len != trailer_len(ctx) {
        return Err(VaultError::CorruptMetadata);
    }

    let hdr = &raw[..FILEOBJ_HDR_LEN];
    let edata = &raw[FILEOBJ_HDR_LEN..FILEOBJ_HDR_LEN + edata_len];
    let trailer = &raw[FILEOBJ_HDR_LEN + edata_len..];

    let plain = if ctx.kind().is_aead() {
        let mut ct = Vec::with_capacity(edata_len + hmac_len);
        ct.extend_from_slice(edata);
        ct.extend_from_slice(trailer);
        ctx.decrypt(&ct, hdr)?
    } else {
        mac::verify(ctx.key()?, &raw[..FILEOBJ_HDR_LEN + edata_len], trailer)?;
        ctx.decrypt(edata, &[])?
    };
    Ok(Zeroizing::new(plain))
}

/// Handle to one open file object inside a vault.
///
/// The vault tracks every open object by id.  Dropping the handle
/// without [`close`](FileObj::close) leaves the registration behind,
/// and the vault will refuse to close until it is released.
#[derive(Debug)]
pub struct FileObj {
    pub(crate) id: u64,
    pub(crate) vname: String,
    pub(crate) path: std::path::PathBuf,
}

impl FileObj {
    /// Cleartext name inside the vault.
    pub fn name(&self) -> &str {
        &self.vname
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and decrypt the whole object.
    pub fn read(&self, vault: &Vault) -> VaultResult<Zeroizing<Vec<u8>>> {
        let raw = fs::read(&self.path)?;
        unseal(vault.crypto(), &raw).map_err(|e| {
            tracing::error!(name = %self.vname, "file object verification failed");
            e
        })
    }

    /// Encrypt and write the whole object, atomically replacing any
    /// previous content (write to a temp file, then rename).
    pub fn write(&self, vault: &Vault, plaintext: &[u8]) -> VaultResult<()> {
        let sealed = seal(vault.crypto(), plaintext)?;

        let dir = self.path.parent().ok_or(VaultError::CorruptMetadata)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&sealed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| VaultError::Io(e.error))?;
        Ok(())
    }

    /// Close the object, removing it from the vault's registry.
    pub fn close(self, vault: &Vault) {
        vault.unregister_file(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redoubt_crypto::{CipherKind, KEY_SIZE};

    const ALL: [CipherKind; 4] = [
        CipherKind::Aes256Cbc,
        CipherKind::Chacha20,
        CipherKind::Aes256Gcm,
        CipherKind::Chacha20Poly1305,
    ];

    fn ctx(kind: CipherKind) -> CryptoCtx {
        let mut ctx = CryptoCtx::new(kind);
        ctx.gen_iv().unwrap();
        ctx.set_key(&[0x42u8; KEY_SIZE]).unwrap();
        ctx
    }

    #[test]
    fn test_seal_unseal_roundtrip_all_ciphers() {
        for kind in ALL {
            let ctx = ctx(kind);
            let sealed = seal(&ctx, b"small secret document").unwrap();
            let plain = unseal(&ctx, &sealed).unwrap();
            assert_eq!(plain.as_slice(), b"small secret document", "{kind:?}");
        }
    }

    #[test]
    fn test_sealed_layout_lengths() {
        // Non-AEAD: 32-byte HMAC; AEAD: 16-byte tag.
        let sealed = seal(&ctx(CipherKind::Chacha20), &[0u8; 100]).unwrap();
        assert_eq!(sealed.len(), FILEOBJ_HDR_LEN + 100 + HMAC_SIZE);

        let sealed = seal(&ctx(CipherKind::Aes256Gcm), &[0u8; 100]).unwrap();
        assert_eq!(sealed.len(), FILEOBJ_HDR_LEN + 100 + 16);

        // CBC pads to the next block.
        let sealed = seal(&ctx(CipherKind::Aes256Cbc), &[0u8; 100]).unwrap();
        assert_eq!(sealed.len(), FILEOBJ_HDR_LEN + 112 + HMAC_SIZE);
    }

    #[test]
    fn test_empty_payload() {
        for kind in ALL {
            let ctx = ctx(kind);
            let sealed = seal(&ctx, b"").unwrap();
            assert_eq!(unseal(&ctx, &sealed).unwrap().as_slice(), b"");
        }
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        for kind in ALL {
            let ctx = ctx(kind);
            let mut sealed = seal(&ctx, b"secret data").unwrap();
            sealed[FILEOBJ_HDR_LEN] ^= 0xFF;
            assert!(
                matches!(unseal(&ctx, &sealed), Err(VaultError::AuthenticationFailed)),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_tampered_trailer_rejected() {
        for kind in ALL {
            let ctx = ctx(kind);
            let mut sealed = seal(&ctx, b"secret data").unwrap();
            let last = sealed.len() - 1;
            sealed[last] ^= 0x01;
            assert!(unseal(&ctx, &sealed).is_err(), "{kind:?}");
        }
    }

    #[test]
    fn test_tampered_header_rejected() {
        for kind in ALL {
            let ctx = ctx(kind);
            let mut sealed = seal(&ctx, b"secret data").unwrap();
            // Flip a padding byte: length checks still pass, the MAC
            // or AEAD tag must catch it.
            sealed[FILEOBJ_HDR_LEN - 1] ^= 0x01;
            assert!(
                matches!(unseal(&ctx, &sealed), Err(VaultError::AuthenticationFailed)),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_truncated_object_rejected() {
        let ctx = ctx(CipherKind::Aes256Gcm);
        let sealed = seal(&ctx, b"secret data").unwrap();
        assert!(matches!(
            unseal(&ctx, &sealed[..sealed.len() - 1]),
            Err(VaultError::CorruptMetadata)
        ));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let ctx = ctx(CipherKind::Chacha20);
        let mut sealed = seal(&ctx, b"data").unwrap();
        sealed[OFF_VER] = FILEOBJ_VER + 1;
        assert!(matches!(
            unseal(&ctx, &sealed),
            Err(VaultError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        for kind in ALL {
            let enc_ctx = ctx(kind);
            let sealed = seal(&enc_ctx, b"secret data").unwrap();

            let mut dec_ctx = CryptoCtx::new(kind);
            dec_ctx.set_iv(enc_ctx.iv()).unwrap();
            dec_ctx.set_key(&[0x13u8; KEY_SIZE]).unwrap();

            // CBC unpadding can accidentally succeed with a wrong key;
            // the HMAC check in front of it cannot.
            assert!(unseal(&dec_ctx, &sealed).is_err(), "{kind:?}");
        }
    }
}
