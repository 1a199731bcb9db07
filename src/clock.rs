//! Clock adapters for token refill.
//!
//! Stores measure elapsed time through the [`Clock`] trait so refill can be
//! driven deterministically in tests. Production code uses [`SystemClock`];
//! tests can share a [`ManualClock`] with the store and advance it by hand.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of monotonic time for a token store.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// System clock using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Share it with a store via `Arc` to control refill from a test:
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokengate::clock::ManualClock;
/// use tokengate::store::MemoryStore;
///
/// let clock = Arc::new(ManualClock::new());
/// let store = MemoryStore::with_clock(1.0, 10.0, Arc::clone(&clock));
/// clock.advance(Duration::from_secs(3));
/// # let _ = store;
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
