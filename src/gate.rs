//! Scoped admission: the retry loop and its blocking and suspending faces.

use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::backoff::Jitter;
use crate::bucket::BucketKey;
use crate::error::Result;
use crate::store::TokenStore;

/// Delays at or below this many seconds retry immediately instead of
/// sleeping.
const WAKE_UP: f64 = 0.0;

/// Outcome of one admission attempt.
enum Step {
    Admitted,
    /// Denied; sleep for the duration, or reattempt at once when `None`.
    Retry(Option<Duration>),
}

/// A scoped admission gate bound to one bucket and consume amount.
///
/// The gate runs one retry protocol in two modes: [`Gate::acquire`] suspends
/// the task between attempts, [`Gate::acquire_blocking`] sleeps the thread.
/// Both consume tokens exactly once per successful admission. Tokens are
/// spent, not leased: dropping the returned [`Admission`] refunds nothing.
///
/// There is no retry cap or timeout; callers needing an upper bound compose
/// a deadline around the gate (for example `tokio::time::timeout`).
#[derive(Debug, Clone)]
pub struct Gate {
    store: Arc<dyn TokenStore>,
    bucket: BucketKey,
    consume: f64,
    jitter: Jitter,
    unit: f64,
}

impl Gate {
    pub(crate) fn new(
        store: Arc<dyn TokenStore>,
        bucket: BucketKey,
        consume: f64,
        jitter: Jitter,
        unit: f64,
    ) -> Self {
        Self {
            store,
            bucket,
            consume,
            jitter,
            unit,
        }
    }

    /// Bucket this gate consumes from.
    pub fn bucket(&self) -> &BucketKey {
        &self.bucket
    }

    /// Tokens consumed per admission.
    pub fn consume(&self) -> f64 {
        self.consume
    }

    /// One pass of the admission protocol, shared by both modes.
    ///
    /// A denied attempt is not an error; only a store failure is, and it
    /// aborts admission without being retried.
    fn step(&self) -> Result<Step> {
        if self.store.try_consume(&self.bucket, self.consume)? {
            return Ok(Step::Admitted);
        }

        // The token count read here is immediately stale under contention;
        // it only shapes the sleep hint.
        let tokens = self.store.tokens(&self.bucket)?;
        let delay = self.jitter.delay(
            self.consume,
            tokens,
            self.store.rate(),
            self.unit,
            &mut rand::thread_rng(),
        );

        if delay <= WAKE_UP {
            return Ok(Step::Retry(None));
        }

        Ok(Step::Retry(Some(Duration::from_secs_f64(delay))))
    }

    /// Block the calling thread until the tokens are granted.
    pub fn acquire_blocking(&self) -> Result<Admission<'_>> {
        loop {
            match self.step()? {
                Step::Admitted => return Ok(Admission { gate: self }),
                Step::Retry(None) => continue,
                Step::Retry(Some(wait)) => {
                    debug!(
                        bucket = %self.bucket,
                        wait = ?wait,
                        "Rate limit reached; sleeping"
                    );
                    thread::sleep(wait);
                }
            }
        }
    }

    /// Suspend the current task until the tokens are granted.
    ///
    /// Cancellation-safe: dropping the future while it waits consumes
    /// nothing, since tokens are only taken by the successful attempt
    /// itself.
    pub async fn acquire(&self) -> Result<Admission<'_>> {
        loop {
            match self.step()? {
                Step::Admitted => return Ok(Admission { gate: self }),
                Step::Retry(None) => continue,
                Step::Retry(Some(wait)) => {
                    debug!(
                        bucket = %self.bucket,
                        wait = ?wait,
                        "Rate limit reached; suspending"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Wrap a blocking operation so that every call admits first.
    pub fn wrap_blocking<F>(&self, op: F) -> Throttled<F> {
        Throttled {
            gate: self.clone(),
            op,
        }
    }

    /// Wrap a suspending operation so that every call admits first.
    ///
    /// The operation's mode is fixed here, at wrap time: a future-returning
    /// closure goes through the suspending loop, never the blocking one.
    pub fn wrap<F>(&self, op: F) -> ThrottledAsync<F> {
        ThrottledAsync {
            gate: self.clone(),
            op,
        }
    }
}

/// Proof that tokens were consumed for one admission.
///
/// Holding it confers nothing further and dropping it is a no-op; admission
/// is consumption, not a lease.
#[derive(Debug)]
pub struct Admission<'a> {
    gate: &'a Gate,
}

impl Admission<'_> {
    /// Bucket the admission consumed from.
    pub fn bucket(&self) -> &BucketKey {
        self.gate.bucket()
    }

    /// Refill-adjusted tokens left in the bucket. Approximate when other
    /// consumers are active.
    pub fn remaining(&self) -> Result<f64> {
        Ok(self.gate.store.tokens(&self.gate.bucket)?)
    }
}

/// A blocking operation paired with its gate.
#[derive(Debug)]
pub struct Throttled<F> {
    gate: Gate,
    op: F,
}

impl<F> Throttled<F> {
    /// Admit, then run the operation.
    ///
    /// The operation's result or panic propagates unmodified; the tokens
    /// stay spent either way.
    pub fn call<T>(&mut self) -> Result<T>
    where
        F: FnMut() -> T,
    {
        self.gate.acquire_blocking()?;
        Ok((self.op)())
    }

    /// The gate admissions go through.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

/// A suspending operation paired with its gate.
#[derive(Debug)]
pub struct ThrottledAsync<F> {
    gate: Gate,
    op: F,
}

impl<F> ThrottledAsync<F> {
    /// Admit, then await the operation.
    ///
    /// The operation's output or failure propagates unmodified; the tokens
    /// stay spent either way.
    pub async fn call<Fut>(&mut self) -> Result<Fut::Output>
    where
        F: FnMut() -> Fut,
        Fut: Future,
    {
        self.gate.acquire().await?;
        Ok((self.op)().await)
    }

    /// The gate admissions go through.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}
