//! redoubt-core: shared pieces of the redoubt secret store.
//!
//! Everything the other crates agree on lives here: the error taxonomy,
//! the TOML configuration surface, and the small value types (client UID,
//! vault flags) that appear in the on-disk metadata record.

pub mod config;
pub mod error;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use types::{Uid, VaultFlags, UID_LEN};
