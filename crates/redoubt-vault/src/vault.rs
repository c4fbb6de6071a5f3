//! Vault lifecycle: init, open, recovery open, close.
//!
//! A handle moves through `Absent -> Initialized -> Open -> Closed`.
//! Opening is blocking by design: scrypt takes its time and the escrow
//! round-trip is synchronous.  Partially constructed handles never
//! leak; every error path drops the crypto context, which wipes the IV
//! and key material.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use redoubt_core::config::KdfTuning;
use redoubt_core::{Uid, VaultError, VaultFlags, VaultResult};
use redoubt_crypto::{mac, CipherKind, CryptoCtx, KdfParams};
use secrecy::SecretString;
use tracing::{error, info, warn};

use crate::escrow::{self, AuthSetup, EscrowClient};
use crate::fileobj::FileObj;
use crate::meta::{self, MetaView, META_PREFIX};
use crate::names;
use crate::recovery;

/// Inputs for creating a new vault.
pub struct InitParams<'a> {
    pub path: &'a Path,
    pub passphrase: &'a SecretString,
    /// Client UID as hex (a UUID); must decode to exactly 16 bytes.
    pub uid: &'a str,
    /// Cipher name, or `None` for the primary default.
    pub cipher: Option<&'a str>,
    pub flags: VaultFlags,
    pub server_url: Option<&'a str>,
    /// Authentication material registered with the escrow server.
    pub auth: AuthSetup,
    pub kdf: KdfTuning,
}

/// Inputs for opening an existing vault.
pub struct OpenParams<'a> {
    pub path: &'a Path,
    pub passphrase: &'a SecretString,
    pub server_url: Option<&'a str>,
    /// One-time token presented to the escrow server; computing it is
    /// the front-end's concern.
    pub totp: Option<&'a str>,
}

/// An open vault: base path, cipher choice and the crypto context
/// holding the effective key.
pub struct Vault {
    base_path: PathBuf,
    server_url: Option<String>,
    cipher: CipherKind,
    flags: VaultFlags,
    uid: Uid,
    crypto: CryptoCtx,
    open_files: RefCell<BTreeSet<u64>>,
    next_file_id: Cell<u64>,
}

/// Normalize the path and check that it points to a directory.
fn vault_dir(path: &Path) -> VaultResult<PathBuf> {
    let rpath = path.canonicalize().map_err(|_| {
        error!(path = %path.display(), "location not found");
        VaultError::NotFound(path.to_path_buf())
    })?;
    if !rpath.is_dir() {
        error!(path = %rpath.display(), "path is not a directory");
        return Err(VaultError::NotADirectory(rpath));
    }
    Ok(rpath)
}

/// Make a freshly created directory entry durable.
fn sync_dir(dir: &Path) -> VaultResult<()> {
    #[cfg(unix)]
    fs::File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

impl Vault {
    /// Initialize a new vault in `params.path`.
    ///
    /// Writes the metadata record with exclusive-create semantics and
    /// registers the envelope with the escrow server unless the vault
    /// is passphrase-only (NOAUTH).  Nothing on disk changes before
    /// the final write; a server registration orphaned by a failing
    /// write is harmless without the local record.
    pub fn init(params: &InitParams<'_>, client: Option<&dyn EscrowClient>) -> VaultResult<()> {
        let cipher = match params.cipher {
            Some(name) => CipherKind::from_name(name)?,
            None => CipherKind::PRIMARY,
        };
        let uid = Uid::from_hex(params.uid)?;
        let base = vault_dir(params.path)?;
        let mpath = meta::meta_path(&base);

        let mut ctx = CryptoCtx::new(cipher);
        ctx.gen_iv()?;

        let kdf_params = KdfParams::generate(&params.kdf)?;
        let kp_blob = kdf_params.to_bytes();

        // K_p: serves as the HMAC key for NOAUTH vaults and as the
        // wrapping key for the envelope otherwise.
        ctx.set_passphrase_key(params.passphrase, &kp_blob)?;

        if !params.flags.contains(VaultFlags::NOAUTH) {
            if params.server_url.is_none() {
                error!("please specify the server URL (option or REDOUBT_SERVER)");
                return Err(VaultError::MissingServer);
            }
            let client = client.ok_or(VaultError::MissingServer)?;
            // On return the context holds the fresh K_e.
            escrow::register_key(&mut ctx, &uid, &params.auth, client)?;
        }

        let mut record = meta::build_record(cipher, params.flags, &uid, ctx.iv(), &kp_blob)?;
        let tag = mac::compute(ctx.key()?, &record)?;
        record.extend_from_slice(&tag);

        let mut opts = OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&mpath).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => VaultError::AlreadyExists(mpath.clone()),
            _ => VaultError::Io(e),
        })?;
        file.write_all(&record)?;
        file.sync_all()?;
        sync_dir(&base)?;

        info!(path = %base.display(), cipher = cipher.name(), "vault initialized");
        Ok(())
        // ctx drops here: K_p/K_e wiped.
    }

    /// Shared tail of `open` and `open_ekey`: build the handle from a
    /// validated metadata view and install the IV.
    fn from_view(
        view: &MetaView,
        base_path: PathBuf,
        server_url: Option<String>,
    ) -> VaultResult<Vault> {
        let mut crypto = CryptoCtx::new(view.cipher);
        crypto.set_iv(&view.iv)?;
        Ok(Vault {
            base_path,
            server_url,
            cipher: view.cipher,
            flags: view.flags,
            uid: view.uid,
            crypto,
            open_files: RefCell::new(BTreeSet::new()),
            next_file_id: Cell::new(1),
        })
    }

    /// Open the vault at the given directory with a passphrase.
    pub fn open(params: &OpenParams<'_>, client: Option<&dyn EscrowClient>) -> VaultResult<Vault> {
        let base = vault_dir(params.path)?;
        let mpath = meta::meta_path(&base);

        let record = fs::read(&mpath).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                error!(path = %mpath.display(), "metadata file not found");
                VaultError::NotFound(mpath.clone())
            } else {
                VaultError::Io(e)
            }
        })?;
        let view = MetaView::parse(&record)?;
        drop(record);

        let mut vault = Self::from_view(&view, base, params.server_url.map(String::from))?;
        vault
            .crypto
            .set_passphrase_key(params.passphrase, &view.kdf_params)?;

        if !view.flags.contains(VaultFlags::NOAUTH) {
            if params.server_url.is_none() {
                error!("please specify the server URL (option or REDOUBT_SERVER)");
                return Err(VaultError::MissingServer);
            }
            let client = client.ok_or(VaultError::MissingServer)?;
            escrow::fetch_key(&mut vault.crypto, &view.uid, params.totp, client)?;
        }

        mac::verify(vault.crypto.key()?, &view.hmac_input, &view.stored_hmac).map_err(|e| {
            error!("verification failed: invalid passphrase?");
            e
        })?;

        info!(path = %vault.base_path.display(), cipher = vault.cipher.name(), "vault opened");
        Ok(vault)
    }

    /// Open the vault for recovery with an out-of-band bundle.
    ///
    /// The effective key comes straight from the bundle: no passphrase
    /// derivation, no server contact, and no HMAC verification — the
    /// bundle is trusted.  The recovered handle has no server URL.
    pub fn open_ekey(path: &Path, recovery_path: &Path) -> VaultResult<Vault> {
        let text = fs::read_to_string(recovery_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                error!(path = %recovery_path.display(), "recovery file not found");
                VaultError::NotFound(recovery_path.to_path_buf())
            } else {
                VaultError::Io(e)
            }
        })?;
        let bundle = recovery::import(&text)?;

        let base = vault_dir(path)?;
        let view = MetaView::parse(&bundle.metadata)?;

        let mut vault = Self::from_view(&view, base, None)?;
        vault.crypto.set_key(&bundle.ekey)?;

        info!(path = %vault.base_path.display(), "vault opened via recovery key");
        Ok(vault)
    }

    /// Close the vault, wiping the in-memory key material.
    ///
    /// Every file object must have been closed first; a non-empty
    /// registry refuses the close with `OpenFiles`.  The handle is
    /// consumed either way, so the IV and key are wiped on refusal
    /// too.
    pub fn close(self) -> VaultResult<()> {
        let leftover = self.open_files.borrow().len();
        if leftover > 0 {
            warn!(count = leftover, "refusing to close vault with open file objects");
            return Err(VaultError::OpenFiles(leftover));
        }
        info!(path = %self.base_path.display(), "vault closed");
        Ok(())
        // crypto drops with self: IV and key wiped.
    }

    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub fn flags(&self) -> VaultFlags {
        self.flags
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn is_noauth(&self) -> bool {
        self.flags.contains(VaultFlags::NOAUTH)
    }

    pub fn open_file_count(&self) -> usize {
        self.open_files.borrow().len()
    }

    pub(crate) fn crypto(&self) -> &CryptoCtx {
        &self.crypto
    }

    pub(crate) fn unregister_file(&self, id: u64) {
        self.open_files.borrow_mut().remove(&id);
    }

    /// Open (or prepare to create) a file object by its cleartext
    /// name.  The object is registered until closed, and the vault
    /// cannot close while any registration remains.
    pub fn open_object(&self, name: &str) -> VaultResult<FileObj> {
        let path = self.resolve_path(name)?;
        let id = self.next_file_id.get();
        self.next_file_id.set(id + 1);
        self.open_files.borrow_mut().insert(id);
        Ok(FileObj {
            id,
            vname: name.to_string(),
            path,
        })
    }

    /// Write a recovery bundle for this vault: the raw metadata record
    /// plus the effective key in cleartext.  The output must be kept
    /// offline; anyone holding it can open the vault.
    pub fn export_recovery(&self, out: &mut dyn Write) -> VaultResult<()> {
        let record = fs::read(meta::meta_path(&self.base_path))?;
        recovery::export(out, &record, self.crypto.key()?)
    }

    /// Map a cleartext object name to its obfuscated on-disk path.
    ///
    /// The object namespace is flat: a name is a single path
    /// component, and separators or dot names are rejected up front.
    pub fn resolve_path(&self, name: &str) -> VaultResult<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(VaultError::BadObjectName(name.to_string()));
        }
        let key = names::name_key(self.crypto.key()?)?;
        Ok(self.base_path.join(names::encrypt_name(&key, name)?))
    }

    /// List the vault's entries, de-obfuscating names.  Dotfiles and
    /// anything under the reserved metadata prefix are invisible;
    /// entries that do not decrypt under this vault's key are skipped.
    pub fn list_dir(&self) -> VaultResult<Vec<String>> {
        let key = names::name_key(self.crypto.key()?)?;

        let mut out = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let fname = entry.file_name();
            let Some(fname) = fname.to_str() else {
                continue;
            };
            if fname.starts_with('.') || fname.starts_with(META_PREFIX) {
                continue;
            }
            match names::decrypt_name(&key, fname) {
                Ok(name) => out.push(name),
                Err(_) => warn!(entry = fname, "skipping foreign entry in vault directory"),
            }
        }
        out.sort();
        Ok(out)
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("base_path", &self.base_path)
            .field("cipher", &self.cipher)
            .field("flags", &self.flags)
            .field("uid", &self.uid)
            .field("open_files", &self.open_file_count())
            .finish()
    }
}
