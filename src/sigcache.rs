//! # SigCache: memo of signatures already verified.
//!
//! Transactions are often verified twice (on mempool admission and again in a
//! block); caching positive `ecVerify` results skips the second round trip to
//! a worker. Only successes are stored: a failed verification is never cached.
//!
//! Entries are keyed by SHA-256 over the length-prefixed `(msg, sig, key)`
//! triple and evicted least-recently-used. Capacity `0` disables the cache.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Cache key for one `(msg, sig, key)` triple.
pub type SigKey = [u8; 32];

/// Bounded LRU set of verified signatures.
pub struct SigCache {
    entries: Option<Mutex<LruCache<SigKey, ()>>>,
}

impl SigCache {
    /// Creates a cache holding up to `capacity` entries (`0` = disabled).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Computes the cache key of a triple.
    pub fn key(msg: &[u8], sig: &[u8], key: &[u8]) -> SigKey {
        let mut h = Sha256::new();
        for part in [msg, sig, key] {
            h.update((part.len() as u64).to_le_bytes());
            h.update(part);
        }
        h.finalize().into()
    }

    /// True if the triple was verified before (refreshes its recency).
    pub fn contains(&self, k: &SigKey) -> bool {
        match &self.entries {
            Some(entries) => entries.lock().get(k).is_some(),
            None => false,
        }
    }

    /// Records a successful verification.
    pub fn insert(&self, k: SigKey) {
        if let Some(entries) = &self.entries {
            entries.lock().put(k, ());
        }
    }

    /// True when the cache stores nothing by configuration.
    pub fn is_disabled(&self) -> bool {
        self.entries.is_none()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.lock().len())
    }

    /// True when no entry is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigCache")
            .field("disabled", &self.is_disabled())
            .field("len", &self.len())
            .finish()
    }
}
