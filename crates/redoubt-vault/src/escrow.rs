//! Escrow server contract.
//!
//! The server holds the envelope-encrypted effective key K_s, keyed by
//! the client UID, and releases it only against a valid one-time token.
//! The wire client (HTTPS, TOTP computation) lives outside this crate;
//! here is the synchronous contract the vault lifecycle calls into,
//! plus the envelope arithmetic both sides of it share.

use std::collections::HashMap;
use std::sync::Mutex;

use redoubt_core::{Uid, VaultError, VaultResult};
use redoubt_crypto::{fill_random, CryptoCtx, KEY_SIZE};
use zeroize::Zeroizing;

/// Authentication material posted once at registration time.  Opaque
/// to the vault core; the CLI front-end fills it in.
#[derive(Debug, Clone, Default)]
pub struct AuthSetup {
    /// Base32 TOTP secret the server should verify tokens against.
    pub totp_secret: Option<String>,
}

/// One escrow server, as seen by the vault lifecycle.  Both calls
/// block; failures come back as `Network` or `AuthFailed` and are never
/// retried here.
pub trait EscrowClient {
    /// One-shot registration: store K_s under the UID.
    fn register(&self, uid: &Uid, auth: &AuthSetup, ks: &[u8]) -> VaultResult<()>;

    /// Authenticate with the one-time token and fetch K_s back.
    fn fetch(&self, uid: &Uid, totp: Option<&str>) -> VaultResult<Vec<u8>>;
}

/// Envelope the effective key at init time.
///
/// The context must currently hold the passphrase-derived K_p.  A fresh
/// K_e is drawn, wrapped under K_p with the vault cipher, posted to the
/// server, and installed in the context; from here on K_p is gone and
/// K_e keys everything, including the metadata HMAC.
pub fn register_key(
    ctx: &mut CryptoCtx,
    uid: &Uid,
    auth: &AuthSetup,
    client: &dyn EscrowClient,
) -> VaultResult<()> {
    let mut ke = Zeroizing::new([0u8; KEY_SIZE]);
    fill_random(ke.as_mut())?;

    let ks = ctx.encrypt(ke.as_ref(), &[])?;
    client.register(uid, auth, &ks)?;

    ctx.set_key(ke.as_ref())
}

/// Fetch and unwrap the effective key at open time.
///
/// The context must currently hold K_p.  The server's K_s is decrypted
/// with it and the result installed as K_e.  A wrong K_s (or a wrong
/// passphrase, with an AEAD cipher doing the wrapping) surfaces as
/// `AuthenticationFailed`, exactly like the later HMAC check would.
pub fn fetch_key(
    ctx: &mut CryptoCtx,
    uid: &Uid,
    totp: Option<&str>,
    client: &dyn EscrowClient,
) -> VaultResult<()> {
    let ks = client.fetch(uid, totp)?;
    let ke = Zeroizing::new(ctx.decrypt(&ks, &[])?);

    if ke.len() != KEY_SIZE {
        return Err(VaultError::BadKey {
            got: ke.len(),
            need: KEY_SIZE,
        });
    }
    ctx.set_key(&ke)
}

/// In-process escrow server used by tests and demos.  Stores envelopes
/// in a map and, when constructed with a token, rejects fetches that do
/// not present it.
#[derive(Default)]
pub struct MemoryEscrow {
    records: Mutex<HashMap<[u8; 16], Vec<u8>>>,
    required_token: Option<String>,
}

impl MemoryEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this token on every fetch, mimicking TOTP verification.
    pub fn with_token(token: &str) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            required_token: Some(token.to_string()),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl EscrowClient for MemoryEscrow {
    fn register(&self, uid: &Uid, _auth: &AuthSetup, ks: &[u8]) -> VaultResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| VaultError::Network("escrow store poisoned".into()))?;
        records.insert(*uid.as_bytes(), ks.to_vec());
        Ok(())
    }

    fn fetch(&self, uid: &Uid, totp: Option<&str>) -> VaultResult<Vec<u8>> {
        if let Some(required) = &self.required_token {
            if totp != Some(required.as_str()) {
                return Err(VaultError::AuthFailed);
            }
        }
        let records = self
            .records
            .lock()
            .map_err(|_| VaultError::Network("escrow store poisoned".into()))?;
        records
            .get(uid.as_bytes())
            .cloned()
            .ok_or(VaultError::AuthFailed)
    }
}
