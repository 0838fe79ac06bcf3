// src/ledger.rs

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Remembers which authorization codes this process has already submitted.
///
/// Only SHA-256 digests are stored, never the codes themselves. Entries
/// expire after the configured TTL; by then the provider has long since
/// invalidated the code.
#[derive(Clone, Debug)]
pub struct CodeLedger {
    seen: Cache<[u8; 32], ()>,
}

impl CodeLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Cache::builder().max_capacity(100_000).time_to_live(ttl).build(),
        }
    }

    /// Records `code`. Returns `false` when it had already been recorded.
    pub async fn claim(&self, code: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(code.as_bytes()).into();
        self.seen.entry(digest).or_insert(()).await.is_fresh()
    }
}
