//! Cache Store Module
//!
//! Thread-safe key/value storage with per-entry TTL and lazy expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats};

// == Cache Capability ==
/// Minimal cache interface handed to code that only needs get/set semantics,
/// such as memoized functions.
pub trait Cache<V>: Send + Sync {
    /// Returns the live value for `key`, if any.
    fn get(&self, key: &str) -> Option<V>;

    /// Stores `value` under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    /// Removes `key` if present.
    fn delete(&self, key: &str);

    /// Removes every entry.
    fn clear(&self);
}

impl<V, T> Cache<V> for Arc<T>
where
    T: Cache<V> + ?Sized,
{
    fn get(&self, key: &str) -> Option<V> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) {
        (**self).delete(key)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
}

// == Cache Store ==
/// In-memory cache shared between threads.
///
/// Every operation runs under one mutex, so a `set` on one thread is visible
/// to any later `get` on another. Capacity is bounded only by TTL expiry.
#[derive(Debug)]
pub struct CacheStore<V = serde_json::Value> {
    inner: Mutex<Inner<V>>,
    default_ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates an empty store whose entries live for `default_ttl` unless
    /// `set` is given an explicit TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::new(),
            }),
            default_ttl,
        }
    }

    // == Set ==
    /// Stores a value, unconditionally replacing any previous entry and
    /// resetting its TTL.
    ///
    /// `ttl = None` uses the store default. `Some(Duration::ZERO)` stores an
    /// entry that is already expired on the next read.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl));

        let mut inner = self.inner.lock();
        inner.entries.insert(key.into(), entry);
        let len = inner.entries.len();
        inner.stats.set_total_entries(len);
    }

    // == Get ==
    /// Retrieves a live value.
    ///
    /// An expired entry is removed while the lock is held and reported as a
    /// miss, so it is never served regardless of when the reaper last ran.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        let lookup = inner
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired_at(now)).then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => {
                inner.stats.record_hit();
                Some(value)
            }
            Some(None) => {
                inner.entries.remove(key);
                inner.stats.set_total_entries(inner.entries.len());
                inner.stats.record_expirations(1);
                inner.stats.record_miss();
                debug!("Lazy expiry removed key '{}'", key);
                None
            }
            None => {
                inner.stats.record_miss();
                None
            }
        }
    }

    /// Retrieves a live value or returns `default`.
    pub fn get_or(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    // == Delete ==
    /// Removes an entry. Returns whether a (possibly expired) entry existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        let len = inner.entries.len();
        inner.stats.set_total_entries(len);
        removed
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats.set_total_entries(0);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were dropped.
    ///
    /// Keys are collected first and removed afterwards, all under one lock
    /// acquisition, so racing with lazy expiry is harmless.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired_keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            inner.entries.remove(key);
        }

        let len = inner.entries.len();
        inner.stats.set_total_entries(len);
        inner.stats.record_expirations(expired_keys.len());
        expired_keys.len()
    }

    // == Stats ==
    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == TTL ==
    /// Remaining lifetime of a live entry, None when absent or expired.
    ///
    /// Does not touch the hit/miss statistics.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let inner = self.inner.lock();
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.ttl_remaining())
    }
}

impl<V> Cache<V> for CacheStore<V>
where
    V: Clone + Send,
{
    fn get(&self, key: &str) -> Option<V> {
        CacheStore::get(self, key)
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        CacheStore::set(self, key, value, ttl)
    }

    fn delete(&self, key: &str) {
        CacheStore::delete(self, key);
    }

    fn clear(&self) {
        CacheStore::clear(self)
    }
}
