//! Cache counters.
//!
//! [`MemoryCache`](crate::MemoryCache) bumps lock-free counters on every
//! operation and hands out [`CacheStats`] snapshots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a cache.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    expired: AtomicU64,
    removed: AtomicU64,
}

impl Counters {
    pub(crate) fn lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stored(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn removed(&self, count: u64) {
        self.removed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a live value.
    pub hits: u64,
    /// Lookups that found nothing or an expired value.
    pub misses: u64,
    /// Values stored, counter updates included.
    pub stores: u64,
    /// Entries dropped because their expiry passed.
    pub expired: u64,
    /// Entries removed by delete, tag clear or clear.
    pub removed: u64,
}

impl CacheStats {
    /// Returns the number of lookups.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Returns the share of lookups that hit, `None` before the first lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> Option<f64> {
        match self.lookups() {
            0 => None,
            lookups => Some(self.hits as f64 / lookups as f64),
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hits={} misses={}", self.hits, self.misses)?;
        if let Some(ratio) = self.hit_ratio() {
            write!(f, " ({:.1}%)", ratio * 100.0)?;
        }
        write!(
            f,
            " stores={} expired={} removed={}",
            self.stores, self.expired, self.removed
        )
    }
}
