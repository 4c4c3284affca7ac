//! In-process cache with TTL and tags.
//!
//! Expired entries are dropped lazily on access. A key belongs to at most one
//! tag; storing it under another tag moves it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tiller_common::{TillerError, TillerResult};
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::stats::{CacheStats, Counters};
use crate::{checked_step, Cache};

#[derive(Debug, Clone)]
struct Entry {
    value: JsonValue,
    expires_at: Option<Instant>,
    tag: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tags: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Some(tag) = &entry.tag {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn store(&mut self, key: &str, entry: Entry) {
        self.remove(key);
        if let Some(tag) = &entry.tag {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.entries.insert(key.to_string(), entry);
    }
}

/// Thread-safe in-memory [`Cache`].
#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl MemoryCache {
    /// Creates a cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a cache on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            counters: Counters::default(),
        }
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        self.counters.removed(inner.entries.len() as u64);
        inner.entries.clear();
        inner.tags.clear();
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at.is_some_and(|at| at <= now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
            self.counters.expired(1);
        }
        expired.len()
    }

    fn put(&self, key: &str, value: JsonValue, expire: Option<Duration>, tag: Option<&str>) {
        let expires_at = expire.map(|ttl| self.clock.now() + ttl);
        self.inner.lock().store(
            key,
            Entry {
                value,
                expires_at,
                tag: tag.map(str::to_string),
            },
        );
        self.counters.stored();
        trace!(key, ?expire, tag, "cache store");
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<JsonValue> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => true,
            Some(entry) => {
                self.counters.lookup(true);
                return Some(entry.value.clone());
            }
            None => false,
        };
        if expired {
            inner.remove(key);
            self.counters.expired(1);
        }
        self.counters.lookup(false);
        None
    }

    fn set(&self, key: &str, value: JsonValue, expire: Option<Duration>) -> TillerResult<()> {
        self.put(key, value, expire, None);
        Ok(())
    }

    fn set_tagged(
        &self,
        key: &str,
        value: JsonValue,
        expire: Option<Duration>,
        tag: &str,
    ) -> TillerResult<()> {
        self.put(key, value, expire, Some(tag));
        Ok(())
    }

    fn delete(&self, key: &str) -> TillerResult<bool> {
        let removed = self.inner.lock().remove(key).is_some();
        if removed {
            self.counters.removed(1);
        }
        Ok(removed)
    }

    fn clear_tag(&self, tag: &str) -> TillerResult<()> {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .tags
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            inner.remove(key);
        }
        self.counters.removed(keys.len() as u64);
        trace!(tag, removed = keys.len(), "cache tag cleared");
        Ok(())
    }

    fn inc(&self, key: &str, step: i64) -> TillerResult<i64> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let live = inner
            .entries
            .get(key)
            .filter(|e| !e.expires_at.is_some_and(|at| at <= now))
            .cloned();

        let next = match &live {
            Some(entry) => {
                let current = entry
                    .value
                    .as_i64()
                    .ok_or_else(|| TillerError::cache_value(key, "not an integer"))?;
                checked_step(key, current, step)?
            }
            None => step,
        };

        let (expires_at, tag) = live.map_or((None, None), |e| (e.expires_at, e.tag));
        inner.store(
            key,
            Entry {
                value: JsonValue::from(next),
                expires_at,
                tag,
            },
        );
        self.counters.stored();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn manual() -> (Arc<ManualClock>, MemoryCache) {
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("a", json!([1, 2]), None).unwrap();
        assert_eq!(cache.get("a"), Some(json!([1, 2])));
        assert!(cache.delete("a").unwrap());
        assert!(!cache.delete("a").unwrap());
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_expiry() {
        let (clock, cache) = manual();
        cache.set("k", json!("v"), Some(Duration::from_secs(10))).unwrap();
        clock.advance(Duration::from_secs(9));
        assert!(cache.has("k"));
        clock.advance(Duration::from_secs(1));
        assert!(!cache.has("k"));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn test_purge_expired() {
        let (clock, cache) = manual();
        cache.set("short", json!(1), Some(Duration::from_secs(1))).unwrap();
        cache.set("forever", json!(2), None).unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_tag_clear() {
        let cache = MemoryCache::new();
        cache.set_tagged("u1", json!(1), None, "user").unwrap();
        cache.tag("user").set("u2", json!(2), None).unwrap();
        cache.set_tagged("o1", json!(3), None, "order").unwrap();

        cache.tag("user").clear().unwrap();
        assert!(!cache.has("u1"));
        assert!(!cache.has("u2"));
        assert!(cache.has("o1"));
        assert_eq!(cache.stats().removed, 2);
    }

    #[test]
    fn test_retag_moves_key() {
        let cache = MemoryCache::new();
        cache.set_tagged("k", json!(1), None, "a").unwrap();
        cache.set_tagged("k", json!(2), None, "b").unwrap();
        cache.clear_tag("a").unwrap();
        assert_eq!(cache.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_inc_dec_keep_expiry() {
        let (clock, cache) = manual();
        assert_eq!(cache.inc("n", 2).unwrap(), 2);
        cache.set("t", json!(5), Some(Duration::from_secs(3))).unwrap();
        assert_eq!(cache.inc("t", 1).unwrap(), 6);
        assert_eq!(cache.dec("t", 4).unwrap(), 2);

        clock.advance(Duration::from_secs(3));
        assert!(!cache.has("t"));
        assert!(cache.has("n"));

        cache.set("s", json!("x"), None).unwrap();
        assert!(cache.inc("s", 1).is_err());
    }

    #[test]
    fn test_inc_overflow_keeps_value() {
        let cache = MemoryCache::new();
        assert_eq!(cache.inc("n", i64::MAX).unwrap(), i64::MAX);

        let err = cache.inc("n", 1).unwrap_err();
        assert_eq!(err.code(), tiller_common::ErrorCode::CacheValue);
        assert_eq!(cache.get("n"), Some(json!(i64::MAX)));

        assert!(cache.dec("m", i64::MIN).is_err());
        assert_eq!(cache.dec("n", 1).unwrap(), i64::MAX - 1);
    }
}
