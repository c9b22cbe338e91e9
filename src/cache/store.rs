//! TTL cache storage.
//!
//! Entries carry an absolute expiry. Expired entries are treated as absent and
//! dropped on the access that notices them; `purge_expired` removes the rest.

use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use crate::util::lock::mutex_lock;

use super::config::CacheConfig;

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "atelier_cache_hit_total";
const METRIC_CACHE_MISS: &str = "atelier_cache_miss_total";
const METRIC_CACHE_EXPIRED: &str = "atelier_cache_expired_total";
const METRIC_CACHE_EVICT: &str = "atelier_cache_evict_total";

/// Cached JSON documents keyed by request path.
pub type ResponseCache = TtlCache<serde_json::Value>;

/// A stored value and the instant after which it must no longer be served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local key/value store with per-entry time-to-live.
///
/// Capacity is bounded by LRU eviction; TTL semantics are independent of it.
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Returns the value for `key` while it is live.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let lookup = entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(value)
            }
            Some(None) => {
                entries.pop(key);
                counter!(METRIC_CACHE_EXPIRED).increment(1);
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Stores `value` until `now + ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };

        let displaced = mutex_lock(&self.entries, SOURCE, "set").push(key.clone(), entry);
        if displaced.is_some_and(|(displaced_key, _)| displaced_key != key) {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        mutex_lock(&self.entries, SOURCE, "remove")
            .pop(key)
            .map(|entry| entry.value)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "purge_expired");

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        if !expired.is_empty() {
            counter!(METRIC_CACHE_EXPIRED).increment(expired.len() as u64);
        }
        expired.len()
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
