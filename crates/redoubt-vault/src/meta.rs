//! Binary vault metadata record.
//!
//! On-disk layout (all multi-byte scalars big-endian):
//!
//! ```text
//! +--------------------------------------+
//! | ver | cipher | flags | kp_len        |  1 byte each
//! | iv_len (2, BE) | uid (16)            |
//! | zero padding to 64 bytes             |
//! +--------------------------------------+
//! | initialization vector (iv_len)       |
//! +--------------------------------------+
//! | KDF parameters (kp_len)              |
//! +--------------------------------------+
//! | HMAC-SHA3-256 (32), keyed by K_e     |
//! +--------------------------------------+
//! ```
//!
//! Total file length is always 64 + iv_len + kp_len + 32.  The HMAC
//! covers every byte before it, padding included.

use std::path::{Path, PathBuf};

use redoubt_core::{Uid, VaultError, VaultFlags, VaultResult, UID_LEN};
use redoubt_crypto::{CipherKind, HMAC_SIZE};

/// Fixed name of the metadata record inside the vault directory.
pub const META_FILE: &str = "redoubt.metadata";

/// Reserved name prefix; files starting with it are never vault
/// payload and are skipped by directory iteration.
pub const META_PREFIX: &str = "redoubt.";

/// On-disk format version.  Bump on any layout change; readers reject
/// anything else.
pub const ABI_VERSION: u8 = 1;

/// Aligned header size.  The fixed fields occupy 22 bytes; the rest of
/// the 64-byte block is zero padding.
pub const HDR_LEN: usize = 64;

const OFF_VER: usize = 0;
const OFF_CIPHER: usize = 1;
const OFF_FLAGS: usize = 2;
const OFF_KP_LEN: usize = 3;
const OFF_IV_LEN: usize = 4;
const OFF_UID: usize = 6;

/// Parsed, owning view of a metadata record.
///
/// Field extraction happens once, up front, after the length bounds
/// have been validated; nothing here borrows the source buffer, so the
/// caller may drop it immediately (the short-lived-mapping rule).
#[derive(Debug)]
pub struct MetaView {
    pub cipher: CipherKind,
    pub flags: VaultFlags,
    pub uid: Uid,
    pub iv: Vec<u8>,
    pub kdf_params: Vec<u8>,
    /// Everything the HMAC covers: header, IV and KDF parameters.
    pub hmac_input: Vec<u8>,
    pub stored_hmac: [u8; HMAC_SIZE],
}

impl MetaView {
    /// Validate and parse a raw record.
    ///
    /// The version byte is checked before anything else so that
    /// incompatible vaults are reported as such without any further
    /// work; every length is then verified before a single field is
    /// trusted.
    pub fn parse(record: &[u8]) -> VaultResult<Self> {
        if record.len() < HDR_LEN {
            tracing::error!("metadata record shorter than the aligned header");
            return Err(VaultError::CorruptMetadata);
        }

        let ver = record[OFF_VER];
        if ver != ABI_VERSION {
            tracing::error!(
                version = ver,
                "incompatible vault version; the vault may have been \
                 created by a newer application"
            );
            return Err(VaultError::IncompatibleVersion(ver));
        }

        let kp_len = record[OFF_KP_LEN] as usize;
        let iv_len = u16::from_be_bytes([record[OFF_IV_LEN], record[OFF_IV_LEN + 1]]) as usize;

        let expected = HDR_LEN + iv_len + kp_len + HMAC_SIZE;
        if record.len() != expected {
            tracing::error!(
                actual = record.len(),
                expected,
                "metadata record length mismatch"
            );
            return Err(VaultError::CorruptMetadata);
        }

        let cipher = CipherKind::from_code(record[OFF_CIPHER])?;
        let flags = VaultFlags::from_bits(record[OFF_FLAGS]).ok_or_else(|| {
            tracing::error!(flags = record[OFF_FLAGS], "unknown flag bits in metadata");
            VaultError::CorruptMetadata
        })?;

        let mut uid_raw = [0u8; UID_LEN];
        uid_raw.copy_from_slice(&record[OFF_UID..OFF_UID + UID_LEN]);

        let authed = expected - HMAC_SIZE;
        let mut stored_hmac = [0u8; HMAC_SIZE];
        stored_hmac.copy_from_slice(&record[authed..]);

        Ok(MetaView {
            cipher,
            flags,
            uid: Uid::from_bytes(uid_raw),
            iv: record[HDR_LEN..HDR_LEN + iv_len].to_vec(),
            kdf_params: record[HDR_LEN + iv_len..authed].to_vec(),
            hmac_input: record[..authed].to_vec(),
            stored_hmac,
        })
    }
}

/// Assemble the authenticated portion of a record (header, IV, KDF
/// parameters).  The caller computes the HMAC over the result and
/// appends it.
pub fn build_record(
    cipher: CipherKind,
    flags: VaultFlags,
    uid: &Uid,
    iv: &[u8],
    kdf_params: &[u8],
) -> VaultResult<Vec<u8>> {
    if kdf_params.len() > u8::MAX as usize {
        return Err(VaultError::BadLength("KDF parameter block"));
    }
    if iv.len() > u16::MAX as usize {
        return Err(VaultError::BadLength("initialization vector"));
    }

    let mut rec = vec![0u8; HDR_LEN];
    rec[OFF_VER] = ABI_VERSION;
    rec[OFF_CIPHER] = cipher.code();
    rec[OFF_FLAGS] = flags.bits();
    rec[OFF_KP_LEN] = kdf_params.len() as u8;
    rec[OFF_IV_LEN..OFF_IV_LEN + 2].copy_from_slice(&(iv.len() as u16).to_be_bytes());
    rec[OFF_UID..OFF_UID + UID_LEN].copy_from_slice(uid.as_bytes());

    rec.extend_from_slice(iv);
    rec.extend_from_slice(kdf_params);
    Ok(rec)
}

pub fn meta_path(base: &Path) -> PathBuf {
    base.join(META_FILE)
}
