//! redoubt-vault: the vault lifecycle and its on-disk formats.
//!
//! A vault is a directory holding one authenticated metadata record
//! (`redoubt.metadata`) and a tree of individually encrypted file
//! objects with obfuscated names.  Opening a vault takes the user
//! passphrase and, unless the vault was created with the NOAUTH flag, a
//! round-trip with the key-escrow server that returns the
//! envelope-encrypted effective key.
//!
//! ```text
//!  init:  passphrase -> K_p -> (register: K_e wrapped as K_s -> server)
//!         -> header + IV + KDF params + HMAC(K_e) written O_EXCL
//!  open:  passphrase -> K_p -> (fetch: K_s -> unwrap -> K_e)
//!         -> HMAC verified -> handle ready
//!  recover: bundle(METADATA, EKEY) -> K_e installed directly
//! ```

pub mod escrow;
pub mod fileobj;
pub mod meta;
pub mod names;
pub mod recovery;
pub mod vault;

pub use escrow::{AuthSetup, EscrowClient, MemoryEscrow};
pub use fileobj::FileObj;
pub use meta::{MetaView, ABI_VERSION, META_FILE, META_PREFIX};
pub use recovery::RecoveryBundle;
pub use vault::{InitParams, OpenParams, Vault};
