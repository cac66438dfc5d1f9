//! Single-use login challenges.
//!
//! Unrelated to transaction replay protection, which the ledger enforces on
//! its own. Expired entries are only dropped by [`NonceManager::purge_expired`];
//! there is no background sweeper.

use crate::error::{ChainError, Result};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct IssuedNonce {
    wallet: String,
    issued_at: Instant,
}

#[derive(Debug)]
pub struct NonceManager {
    ttl: Duration,
    issued: Mutex<HashMap<String, IssuedNonce>>,
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_TTL)
    }
}

impl NonceManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, issued: Mutex::new(HashMap::new()) }
    }

    /// Fresh challenge for `wallet`: 32 random bytes, hex encoded.
    pub fn issue(&self, wallet: &str) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);

        self.issued.lock().insert(
            nonce.clone(),
            IssuedNonce { wallet: wallet.to_ascii_lowercase(), issued_at: Instant::now() },
        );
        debug!(%wallet, "Issued login nonce");
        nonce
    }

    /// Accept `nonce` once, for the wallet it was issued to, before it expires.
    pub fn consume(&self, wallet: &str, nonce: &str) -> Result<()> {
        let mut issued = self.issued.lock();

        let entry = issued.get(nonce).ok_or_else(|| {
            ChainError::Replay("Unknown or already used nonce".to_string())
        })?;
        if entry.wallet != wallet.to_ascii_lowercase() {
            return Err(ChainError::Validation(format!(
                "Nonce was not issued to {}",
                wallet
            )));
        }
        let expired = entry.issued_at.elapsed() > self.ttl;

        issued.remove(nonce);
        if expired {
            return Err(ChainError::Validation("Nonce has expired".to_string()));
        }
        Ok(())
    }

    /// Drop every expired nonce. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut issued = self.issued.lock();
        let before = issued.len();
        let ttl = self.ttl;
        issued.retain(|_, entry| entry.issued_at.elapsed() <= ttl);
        before - issued.len()
    }

    pub fn outstanding(&self) -> usize {
        self.issued.lock().len()
    }
}
