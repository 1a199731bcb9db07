//! Tokengate - token-bucket rate limiting with scoped admission.
//!
//! This crate gates units of work against a shared rate budget: consume N
//! tokens from a named bucket that refills at rate R up to capacity C,
//! holding the caller back with jittered backoff until the tokens are
//! available. One admission loop backs both a blocking mode for threads and
//! a suspending mode for async tasks, and independent call sites share or
//! isolate bucket state by name.

pub mod backoff;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod limiter;
pub mod store;

pub use backoff::Jitter;
pub use bucket::{BucketKey, BucketName, DEFAULT_BUCKET};
pub use config::Settings;
pub use error::{Error, Result, StoreError};
pub use gate::{Admission, Gate, Throttled, ThrottledAsync};
pub use limiter::{Limiter, Overrides};
pub use store::{MemoryStore, TokenStore};
