//! Result caching for Tiller.
//!
//! The connection engine talks to a cache only through the [`Cache`] trait:
//!
//! - **Read-through**: cached select results keyed by an explicit or derived key
//! - **Invalidation**: writes delete a key or clear every key under a tag
//! - **Counters**: `inc`/`dec` back the lazy counter writes
//!
//! [`MemoryCache`] is the in-process implementation with TTL, tags and
//! statistics.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tiller_cache::{Cache, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! cache.set_tagged("user:1", serde_json::json!({"id": 1}), None, "user").unwrap();
//! assert!(cache.has("user:1"));
//!
//! cache.tag("user").clear().unwrap();
//! assert!(!cache.has("user:1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod memory;
pub mod stats;

use std::time::Duration;

use serde_json::Value as JsonValue;
use tiller_common::{TillerError, TillerResult};

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryCache;
pub use stats::CacheStats;

/// Key/value store consulted by the connection engine.
///
/// Values are JSON documents; an `expire` of `None` keeps the entry until it
/// is deleted.
pub trait Cache: Send + Sync {
    /// Returns the live value stored under `key`.
    fn get(&self, key: &str) -> Option<JsonValue>;

    /// Stores a value.
    fn set(&self, key: &str, value: JsonValue, expire: Option<Duration>) -> TillerResult<()>;

    /// Stores a value and registers its key under `tag`.
    fn set_tagged(
        &self,
        key: &str,
        value: JsonValue,
        expire: Option<Duration>,
        tag: &str,
    ) -> TillerResult<()>;

    /// Removes a key. Returns true if it was present.
    fn delete(&self, key: &str) -> TillerResult<bool>;

    /// Returns true if a live value is stored under `key`.
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes every key registered under `tag`.
    fn clear_tag(&self, tag: &str) -> TillerResult<()>;

    /// Adds `step` to the integer under `key`, creating it at zero, and
    /// returns the new value. The default stores the result without expiry.
    fn inc(&self, key: &str, step: i64) -> TillerResult<i64> {
        let current = match self.get(key) {
            Some(value) => value
                .as_i64()
                .ok_or_else(|| TillerError::cache_value(key, "not an integer"))?,
            None => 0,
        };
        let next = checked_step(key, current, step)?;
        self.set(key, JsonValue::from(next), None)?;
        Ok(next)
    }

    /// Subtracts `step` from the integer under `key`.
    fn dec(&self, key: &str, step: i64) -> TillerResult<i64> {
        let negated = step
            .checked_neg()
            .ok_or_else(|| TillerError::cache_value(key, format!("cannot negate {step}")))?;
        self.inc(key, negated)
    }

    /// Returns a handle scoped to one tag.
    fn tag<'a>(&'a self, name: &str) -> TaggedCache<'a, Self>
    where
        Self: Sized,
    {
        TaggedCache {
            cache: self,
            tag: name.to_string(),
        }
    }
}

/// Adds `step` to a cached counter, failing instead of wrapping.
pub(crate) fn checked_step(key: &str, current: i64, step: i64) -> TillerResult<i64> {
    current
        .checked_add(step)
        .ok_or_else(|| TillerError::cache_value(key, format!("{current} + {step} overflows")))
}

/// A cache handle scoped to one tag.
pub struct TaggedCache<'a, C: Cache + ?Sized> {
    cache: &'a C,
    tag: String,
}

impl<C: Cache + ?Sized> TaggedCache<'_, C> {
    /// Stores a value under this tag.
    pub fn set(&self, key: &str, value: JsonValue, expire: Option<Duration>) -> TillerResult<()> {
        self.cache.set_tagged(key, value, expire, &self.tag)
    }

    /// Removes every key registered under this tag.
    pub fn clear(&self) -> TillerResult<()> {
        self.cache.clear_tag(&self.tag)
    }

    /// Returns the tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.tag
    }
}
