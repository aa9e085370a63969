//! In-memory TTL cache.
//!
//! Entries carry their own TTL and are checked lazily on read - there is
//! no background sweeper. Writes always replace the whole entry, never
//! patch it in place. State is in-memory only and resets on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

/// A cached value plus its freshness bound.
///
/// Valid iff `stored_at.elapsed() <= ttl`.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// Whether the entry is still within its freshness bound.
    pub fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() <= self.ttl
    }
}

/// Cache size and key listing, as reported by [`TtlCache::stats`].
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Keyed TTL cache with per-entry freshness bounds.
///
/// Thread-safe; shared via `Arc` between the aggregator, the batch
/// orchestrator and external callers. Expired entries are evicted on the
/// read that observes them, or by explicit `invalidate`/`clear`.
pub struct TtlCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Lock the entry map, recovering from poison if necessary.
    ///
    /// Losing cached values to a recovered poison is harmless - the next
    /// read falls through to the sources.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Get a fresh value, lazily evicting the entry if it expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.lock_entries();

        match entries.get(key) {
            Some(entry) if entry.is_fresh() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("Cache: entry '{}' expired, evicting", key);
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value under `key` with the given TTL, replacing any
    /// previous entry.
    pub fn insert(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let mut entries = self.lock_entries();
        entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Remove every entry whose key contains `pattern`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();
        debug!("Cache: invalidated {} entries matching '{}'", removed, pattern);
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.lock_entries();
        entries.clear();
        debug!("Cache: cleared");
    }

    /// Current size and keys. Expired-but-unread entries still count
    /// until a read or invalidation removes them.
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock_entries();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: entries.len(),
            keys,
        }
    }

    /// Reads that found a fresh entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Reads that found nothing (or only an expired entry).
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
