//! Time sources for cache expiry.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Time source for expiry and write windows.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Returns milliseconds since the Unix epoch. Stored in the cache, so
    /// it must stay comparable across connections.
    fn unix_millis(&self) -> u64;
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        system_millis()
    }
}

/// A clock that only moves when advanced. Used to test expiry.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_millis: u64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_millis: system_millis(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn unix_millis(&self) -> u64 {
        let offset = u64::try_from(self.offset.lock().as_millis()).unwrap_or(u64::MAX);
        self.base_millis.saturating_add(offset)
    }
}
