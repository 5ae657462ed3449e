//! TTL response cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::fingerprint::normalize_operation;
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

struct CacheEntry {
    fingerprint: String,
    value: Value,
    stored_at: Instant,
    ttl: Duration,
    checksum: String,
}

impl CacheEntry {
    fn new(fingerprint: &str, value: Value, stored_at: Instant, ttl: Duration) -> Self {
        let checksum = checksum(&value);
        Self {
            fingerprint: fingerprint.to_string(),
            value,
            stored_at,
            ttl,
            checksum,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.stored_at + self.ttl
    }

    fn validate(&self, key: &str) -> Result<(), CacheError> {
        if self.fingerprint != key {
            return Err(CacheError::Corrupt {
                fingerprint: key.to_string(),
                reason: format!("stored under '{}'", self.fingerprint),
            });
        }
        if checksum(&self.value) != self.checksum {
            return Err(CacheError::Corrupt {
                fingerprint: key.to_string(),
                reason: "checksum mismatch".to_string(),
            });
        }
        Ok(())
    }
}

fn checksum(value: &Value) -> String {
    hex::encode(Sha256::digest(value.to_string().as_bytes()))
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries evicted because their ttl ran out.
    pub expired: u64,
    /// Entries dropped because they failed validation.
    pub corrupt: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    corrupt: AtomicU64,
}

enum Lookup {
    Hit(Value),
    Missing,
    Expired,
    Corrupt(CacheError),
}

/// Memo of AI responses keyed by [`Fingerprint`](super::Fingerprint).
///
/// Nothing is ever served at or past `stored_at + ttl`.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            counters: Counters::default(),
        }
    }

    /// Look up a live entry.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        let now = self.clock.now();
        let lookup = match self.entries.get(fingerprint) {
            None => Lookup::Missing,
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => match entry.validate(fingerprint) {
                Ok(()) => Lookup::Hit(entry.value.clone()),
                Err(e) => Lookup::Corrupt(e),
            },
        };

        match lookup {
            Lookup::Hit(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Cache hit {}", fingerprint);
                Some(value)
            }
            Lookup::Missing => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Expired => {
                // A fresh put may have replaced the entry since the read.
                if self
                    .entries
                    .remove_if(fingerprint, |_, e| e.is_expired(now))
                    .is_some()
                {
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    debug!("Evicted expired cache entry {}", fingerprint);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Corrupt(error) => {
                warn!("{}; dropping entry", error);
                self.entries.remove(fingerprint);
                self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` for `ttl`. A zero ttl stores nothing.
    pub fn put(&self, fingerprint: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry::new(fingerprint, value, self.clock.now(), ttl);
        self.entries.insert(fingerprint.to_string(), entry);
        trace!("Cached {} for {:?}", fingerprint, ttl);
    }

    /// Remove every entry for which `predicate(fingerprint, value)` holds.
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, &Value) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !predicate(key, &entry.value));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Invalidated {} cache entries", removed);
        }
        removed
    }

    /// Remove every entry cached for `operation`.
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        let prefix = format!("{}:", normalize_operation(operation));
        self.invalidate(|key, _| key.starts_with(&prefix))
    }

    pub fn remove(&self, fingerprint: &str) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Evict every expired entry.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.counters
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` is
    /// cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            debug!("Cache sweep evicted {} entries", removed);
                        }
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            corrupt: self.counters.corrupt.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
