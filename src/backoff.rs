//! Backoff and jitter for denied admission attempts.

use rand::Rng;

/// Default unit divisor: jitter magnitudes are in milliseconds.
pub const MS_IN_SEC: f64 = 1000.0;

/// Range bounded jitter draws from, in time units.
const DEFAULT_RANGE: (i64, i64, i64) = (0, 50, 1);

/// Jitter policy applied to a computed backoff delay.
///
/// When a consumption attempt is denied, the estimated wait is perturbed by
/// a magnitude drawn per this policy, added or subtracted with equal
/// probability so that concurrent waiters wake up out of step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Jitter {
    /// Use the delay as computed.
    #[default]
    None,
    /// Perturb by a fixed number of seconds.
    Fixed(f64),
    /// Perturb by a random draw from the default range, scaled by the
    /// configured unit.
    Bounded,
    /// Perturb by a random draw from `start..stop` stepping by `step`,
    /// scaled by the configured unit.
    Range { start: i64, stop: i64, step: i64 },
}

impl Jitter {
    /// Range jitter with a step of one.
    pub fn range(start: i64, stop: i64) -> Self {
        Jitter::Range {
            start,
            stop,
            step: 1,
        }
    }

    /// Estimated seconds until `consume` tokens are available, perturbed
    /// per this policy.
    ///
    /// The base estimate `(consume - tokens) / rate` assumes no competing
    /// consumers; it is a sleep hint, not a guarantee. The result may be
    /// zero or negative, which callers treat as "retry immediately".
    pub fn delay(
        &self,
        consume: f64,
        tokens: f64,
        rate: f64,
        unit: f64,
        rng: &mut impl Rng,
    ) -> f64 {
        let base = (consume - tokens) / rate;

        let magnitude = match *self {
            Jitter::None => return base,
            Jitter::Fixed(seconds) => seconds,
            Jitter::Bounded => {
                let (start, stop, step) = DEFAULT_RANGE;
                randrange(start, stop, step, rng) as f64 / unit
            }
            Jitter::Range { start, stop, step } => randrange(start, stop, step, rng) as f64 / unit,
        };

        if rng.gen_bool(0.5) {
            base + magnitude
        } else {
            base - magnitude
        }
    }
}

/// Uniform draw from `start..stop` stepping by `step`.
///
/// Degenerate ranges (non-positive step, stop at or below start) collapse
/// to `start` rather than panicking; [`crate::limiter::Builder`] rejects
/// them before they reach a live gate.
fn randrange(start: i64, stop: i64, step: i64, rng: &mut impl Rng) -> i64 {
    if step <= 0 || stop <= start {
        return start;
    }
    let steps = (stop - start + step - 1).div_euclid(step);
    start + step * rng.gen_range(0..steps)
}
