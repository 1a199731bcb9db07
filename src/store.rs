//! Token stores: the refillable per-bucket counters behind admission.

use std::fmt;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::bucket::BucketKey;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// Storage contract for per-bucket token state.
///
/// A store is constructed once per distinct (rate, capacity) pair and holds
/// one refillable counter per bucket key. `try_consume` must behave as an
/// atomic check-and-decrement: concurrent callers targeting the same key
/// never jointly spend more tokens than have accrued. `tokens` may be
/// approximate under concurrent mutation; it only feeds backoff estimates,
/// never admission decisions.
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Refill the bucket for elapsed time, then consume `amount` tokens if
    /// that many are available. Returns `false` and leaves the count
    /// unchanged when they are not.
    fn try_consume(&self, key: &BucketKey, amount: f64) -> Result<bool, StoreError>;

    /// Current refill-adjusted token count, without consuming.
    fn tokens(&self, key: &BucketKey) -> Result<f64, StoreError>;

    /// Refill rate in tokens per second, fixed at construction.
    fn rate(&self) -> f64;

    /// Maximum tokens a bucket can hold, fixed at construction.
    fn capacity(&self) -> f64;
}

/// Per-bucket counter state.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    updated: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.updated = now;
    }
}

/// In-memory token store.
///
/// Buckets are created lazily at full capacity on first reference and live
/// for the lifetime of the store. Each mutation happens under the bucket's
/// map shard lock, so check-and-decrement is atomic per key.
#[derive(Debug)]
pub struct MemoryStore<C = SystemClock> {
    rate: f64,
    capacity: f64,
    buckets: DashMap<BucketKey, BucketState>,
    clock: C,
}

impl MemoryStore {
    /// Create a store refilling at `rate` tokens per second up to
    /// `capacity`, measuring time with the system clock.
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self::with_clock(rate, capacity, SystemClock::new())
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Create a store with an explicit clock.
    pub fn with_clock(rate: f64, capacity: f64, clock: C) -> Self {
        Self {
            rate,
            capacity,
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Number of buckets the store has materialized.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<C: Clock + fmt::Debug> TokenStore for MemoryStore<C> {
    fn try_consume(&self, key: &BucketKey, amount: f64) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut state = self.buckets.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                capacity = self.capacity,
                "Creating bucket at full capacity"
            );
            BucketState {
                tokens: self.capacity,
                updated: now,
            }
        });

        state.refill(now, self.rate, self.capacity);

        if state.tokens >= amount {
            state.tokens -= amount;
            trace!(
                key = %key,
                amount = amount,
                remaining = state.tokens,
                "Consumed tokens"
            );
            Ok(true)
        } else {
            trace!(
                key = %key,
                amount = amount,
                available = state.tokens,
                "Consumption denied"
            );
            Ok(false)
        }
    }

    fn tokens(&self, key: &BucketKey) -> Result<f64, StoreError> {
        let now = self.clock.now();
        let mut state = self.buckets.entry(key.clone()).or_insert_with(|| BucketState {
            tokens: self.capacity,
            updated: now,
        });

        state.refill(now, self.rate, self.capacity);
        Ok(state.tokens)
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn capacity(&self) -> f64 {
        self.capacity
    }
}
