//! Limiter configuration: immutable rate, capacity, consume amount, bucket,
//! and jitter settings around a shared token store.

use std::sync::Arc;

use crate::backoff::{Jitter, MS_IN_SEC};
use crate::bucket::{BucketKey, BucketName, DEFAULT_BUCKET};
use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::store::{MemoryStore, TokenStore};

/// Tokens consumed per admission unless overridden.
pub const DEFAULT_CONSUME: f64 = 1.0;

/// Numeric configuration fields must be positive and finite; anything else
/// would stall or panic the admission loop instead of failing here.
fn check_positive(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        return Ok(());
    }
    Err(Error::Config(format!(
        "{} must be a positive number, got {}",
        field, value
    )))
}

fn check_jitter(jitter: Jitter) -> Result<()> {
    match jitter {
        Jitter::Fixed(seconds) if !seconds.is_finite() => Err(Error::Config(format!(
            "fixed jitter must be finite, got {}",
            seconds
        ))),
        Jitter::Range { start, stop, step } if step <= 0 || stop <= start => {
            Err(Error::Config(format!(
                "jitter range [{}, {}, {}] must have a positive step and stop greater than start",
                start, stop, step
            )))
        }
        _ => Ok(()),
    }
}

/// An immutable rate-limiter configuration.
///
/// Cloning or deriving a limiter shares its token store, so every variant
/// draws from the same bucket family. Rate and capacity are fixed once the
/// store exists, because the store's refill semantics are keyed to them at
/// construction; [`Limiter::rebuild`] produces a variant with a fresh store
/// when they must change.
#[derive(Debug, Clone)]
pub struct Limiter {
    rate: f64,
    capacity: f64,
    consume: f64,
    bucket: BucketKey,
    jitter: Jitter,
    unit: f64,
    store: Arc<dyn TokenStore>,
}

impl Limiter {
    /// Create a limiter with default consume amount, bucket, jitter, and
    /// unit, backed by a fresh in-memory store.
    ///
    /// Fails with [`Error::Config`] unless rate and capacity are positive
    /// finite numbers.
    pub fn new(rate: f64, capacity: f64) -> Result<Self> {
        Self::builder(rate, capacity).build()
    }

    /// Start building a limiter with non-default fields.
    pub fn builder(rate: f64, capacity: f64) -> Builder {
        Builder {
            rate,
            capacity,
            consume: DEFAULT_CONSUME,
            bucket: BucketName::Bytes(DEFAULT_BUCKET.to_vec()),
            jitter: Jitter::default(),
            unit: MS_IN_SEC,
            store: None,
        }
    }

    /// Refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum tokens a bucket holds.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens consumed per admission.
    pub fn consume(&self) -> f64 {
        self.consume
    }

    /// Default bucket admissions draw from.
    pub fn bucket(&self) -> &BucketKey {
        &self.bucket
    }

    /// Jitter policy for backoff delays.
    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Divisor converting jitter magnitudes to seconds.
    pub fn unit(&self) -> f64 {
        self.unit
    }

    /// Handle to the token store backing this limiter.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Derive a variant that shares this limiter's token store.
    ///
    /// Explicitly supplied fields replace the current ones; the rest are
    /// inherited. Rate and capacity cannot change through this path and are
    /// rejected with [`Error::ImmutableRateCapacity`]; use
    /// [`Limiter::rebuild`] for those.
    pub fn derive(&self, overrides: Overrides) -> Result<Limiter> {
        if overrides.rate.is_some() || overrides.capacity.is_some() {
            return Err(Error::ImmutableRateCapacity);
        }

        let consume = overrides.consume.unwrap_or(self.consume);
        check_positive("consume", consume)?;
        let unit = overrides.unit.unwrap_or(self.unit);
        check_positive("unit", unit)?;
        let jitter = overrides.jitter.unwrap_or(self.jitter);
        check_jitter(jitter)?;

        let bucket = match overrides.bucket {
            Some(name) => name.resolve()?,
            None => self.bucket.clone(),
        };

        Ok(Limiter {
            rate: self.rate,
            capacity: self.capacity,
            consume,
            bucket,
            jitter,
            unit,
            store: Arc::clone(&self.store),
        })
    }

    /// Derive a variant with a fresh in-memory store.
    ///
    /// Any field may change, including rate and capacity; no bucket state
    /// is shared with the original.
    pub fn rebuild(&self, overrides: Overrides) -> Result<Limiter> {
        let bucket = overrides
            .bucket
            .unwrap_or_else(|| BucketName::Bytes(self.bucket.as_bytes().to_vec()));

        Limiter::builder(
            overrides.rate.unwrap_or(self.rate),
            overrides.capacity.unwrap_or(self.capacity),
        )
        .consume(overrides.consume.unwrap_or(self.consume))
        .bucket(bucket)
        .jitter(overrides.jitter.unwrap_or(self.jitter))
        .unit(overrides.unit.unwrap_or(self.unit))
        .build()
    }

    /// Gate bound to this limiter's default consume amount and bucket.
    pub fn scope(&self) -> Gate {
        Gate::new(
            Arc::clone(&self.store),
            self.bucket.clone(),
            self.consume,
            self.jitter,
            self.unit,
        )
    }

    /// Gate consuming `consume` tokens per admission from `bucket`.
    pub fn scope_with(&self, consume: f64, bucket: impl Into<BucketName>) -> Result<Gate> {
        check_positive("consume", consume)?;
        let key = bucket.into().resolve()?;
        Ok(Gate::new(
            Arc::clone(&self.store),
            key,
            consume,
            self.jitter,
            self.unit,
        ))
    }
}

/// Field overrides for [`Limiter::derive`] and [`Limiter::rebuild`].
///
/// `None` fields inherit from the limiter being derived from.
#[derive(Debug, Default)]
pub struct Overrides {
    pub rate: Option<f64>,
    pub capacity: Option<f64>,
    pub consume: Option<f64>,
    pub bucket: Option<BucketName>,
    pub jitter: Option<Jitter>,
    pub unit: Option<f64>,
}

/// Builder for [`Limiter`].
#[derive(Debug)]
pub struct Builder {
    rate: f64,
    capacity: f64,
    consume: f64,
    bucket: BucketName,
    jitter: Jitter,
    unit: f64,
    store: Option<Arc<dyn TokenStore>>,
}

impl Builder {
    /// Tokens consumed per admission.
    pub fn consume(mut self, tokens: f64) -> Self {
        self.consume = tokens;
        self
    }

    /// Bucket admissions draw from by default.
    pub fn bucket(mut self, name: impl Into<BucketName>) -> Self {
        self.bucket = name.into();
        self
    }

    /// Jitter policy for backoff delays.
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Divisor converting jitter magnitudes to seconds.
    pub fn unit(mut self, unit: f64) -> Self {
        self.unit = unit;
        self
    }

    /// Supply a token store instead of constructing an in-memory one.
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the fields and build the limiter.
    pub fn build(self) -> Result<Limiter> {
        check_positive("rate", self.rate)?;
        check_positive("capacity", self.capacity)?;
        check_positive("consume", self.consume)?;
        check_positive("unit", self.unit)?;
        check_jitter(self.jitter)?;

        let bucket = self.bucket.resolve()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(self.rate, self.capacity)));

        Ok(Limiter {
            rate: self.rate,
            capacity: self.capacity,
            consume: self.consume,
            bucket,
            jitter: self.jitter,
            unit: self.unit,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_documented_defaults() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();

        assert_eq!(limiter.rate(), 2.0);
        assert_eq!(limiter.capacity(), 3.0);
        assert_eq!(limiter.consume(), 1.0);
        assert_eq!(limiter.bucket().as_bytes(), b"default");
        assert_eq!(limiter.jitter(), Jitter::None);
        assert_eq!(limiter.unit(), MS_IN_SEC);
    }

    #[test]
    fn test_builder_sets_every_field() {
        let limiter = Limiter::builder(4.0, 8.0)
            .consume(2.0)
            .bucket("writes")
            .jitter(Jitter::Bounded)
            .unit(100.0)
            .build()
            .unwrap();

        assert_eq!(limiter.consume(), 2.0);
        assert_eq!(limiter.bucket().as_bytes(), b"writes");
        assert_eq!(limiter.jitter(), Jitter::Bounded);
        assert_eq!(limiter.unit(), 100.0);
    }

    #[test]
    fn test_builder_rejects_nonpositive_fields() {
        assert!(matches!(
            Limiter::builder(0.0, 3.0).build().unwrap_err(),
            Error::Config(_)
        ));
        assert!(matches!(
            Limiter::builder(1.0, -1.0).build().unwrap_err(),
            Error::Config(_)
        ));
        assert!(matches!(
            Limiter::builder(1.0, 1.0).consume(0.0).build().unwrap_err(),
            Error::Config(_)
        ));
        assert!(matches!(
            Limiter::builder(1.0, 1.0).unit(f64::NAN).build().unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_new_rejects_nonpositive_rate_and_capacity() {
        // A zero rate must fail at construction, not stall the admission
        // loop with an unrepresentable sleep later.
        assert!(matches!(
            Limiter::new(0.0, 1.0).unwrap_err(),
            Error::Config(_)
        ));
        assert!(matches!(
            Limiter::new(1.0, f64::INFINITY).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_builder_rejects_degenerate_jitter_range() {
        let err = Limiter::builder(1.0, 1.0)
            .jitter(Jitter::Range { start: 0, stop: 50, step: 0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Limiter::builder(1.0, 1.0)
            .jitter(Jitter::range(40, 10))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Limiter::builder(1.0, 1.0)
            .jitter(Jitter::Fixed(f64::NAN))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_derive_validates_overrides() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();

        let err = limiter
            .derive(Overrides {
                consume: Some(-1.0),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = limiter
            .derive(Overrides {
                unit: Some(0.0),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rebuild_validates_overrides() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();

        let err = limiter
            .rebuild(Overrides {
                rate: Some(0.0),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_scope_with_rejects_nonpositive_consume() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();
        assert!(matches!(
            limiter.scope_with(0.0, "bucket").unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_derive_shares_the_store() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();
        let derived = limiter
            .derive(Overrides {
                bucket: Some("other".into()),
                ..Overrides::default()
            })
            .unwrap();

        assert!(Arc::ptr_eq(limiter.store(), derived.store()));
        assert_eq!(derived.bucket().as_bytes(), b"other");
        assert_eq!(derived.rate(), 2.0);
    }

    #[test]
    fn test_derive_rejects_rate_and_capacity() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();

        let err = limiter
            .derive(Overrides {
                rate: Some(5.0),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableRateCapacity));

        let err = limiter
            .derive(Overrides {
                capacity: Some(5.0),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableRateCapacity));
    }

    #[test]
    fn test_rebuild_constructs_a_fresh_store() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();
        let rebuilt = limiter
            .rebuild(Overrides {
                rate: Some(5.0),
                ..Overrides::default()
            })
            .unwrap();

        assert!(!Arc::ptr_eq(limiter.store(), rebuilt.store()));
        assert_eq!(rebuilt.rate(), 5.0);
        assert_eq!(rebuilt.capacity(), 3.0);
    }

    #[test]
    fn test_rebuild_inherits_unchanged_fields() {
        let limiter = Limiter::builder(2.0, 3.0)
            .consume(2.0)
            .bucket("inherit")
            .build()
            .unwrap();

        let rebuilt = limiter.rebuild(Overrides::default()).unwrap();
        assert_eq!(rebuilt.consume(), 2.0);
        assert_eq!(rebuilt.bucket().as_bytes(), b"inherit");
    }

    #[test]
    fn test_scope_with_resolves_the_bucket() {
        let limiter = Limiter::new(2.0, 3.0).unwrap();
        let gate = limiter.scope_with(2.0, "burst").unwrap();

        assert_eq!(gate.bucket().as_bytes(), b"burst");
        assert_eq!(gate.consume(), 2.0);

        assert!(limiter.scope_with(1.0, "").is_err());
    }
}
