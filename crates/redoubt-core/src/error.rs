use std::path::PathBuf;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

/// All errors that can surface from the redoubt core.
///
/// Nothing is retried internally; every kind propagates to the caller,
/// and every error path is responsible for wiping whatever key material
/// it created before returning.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- input ---
    #[error("location `{0}` not found")]
    NotFound(PathBuf),

    #[error("path `{0}` is not a directory")]
    NotADirectory(PathBuf),

    #[error("invalid user ID (UID); it must be a UUID in hex representation")]
    BadUid,

    #[error("invalid or unsupported cipher `{0}`")]
    UnsupportedCipher(String),

    #[error("no server URL specified")]
    MissingServer,

    #[error("recovery bundle malformed: {0}")]
    BadRecovery(String),

    #[error("key has wrong length: got {got} bytes, cipher needs {need}")]
    BadKey { got: usize, need: usize },

    #[error("bad length for {0}")]
    BadLength(&'static str),

    #[error("invalid object name `{0}`")]
    BadObjectName(String),

    // --- integrity ---
    #[error("metadata record corrupted")]
    CorruptMetadata,

    #[error("incompatible vault version {0}")]
    IncompatibleVersion(u8),

    /// HMAC mismatch.  The core cannot distinguish a corrupted record
    /// from a wrong key, so the message only hints at the likely cause.
    #[error("verification failed: invalid passphrase?")]
    AuthenticationFailed,

    // --- external ---
    #[error("server communication failed: {0}")]
    Network(String),

    #[error("server rejected authentication")]
    AuthFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- resource ---
    #[error("out of memory")]
    OutOfMemory,

    #[error("random generator failure: {0}")]
    Rng(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    // --- precondition ---
    #[error("vault already exists at `{0}`")]
    AlreadyExists(PathBuf),

    #[error("vault has {0} open file objects")]
    OpenFiles(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_failure_hints_at_passphrase() {
        // The wording is part of the contract: no further diagnosis.
        assert_eq!(
            VaultError::AuthenticationFailed.to_string(),
            "verification failed: invalid passphrase?"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: VaultError = io.into();
        assert!(matches!(err, VaultError::Io(_)));
    }
}
