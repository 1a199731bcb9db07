//! Error types for tokengate.

use thiserror::Error;

/// Opaque failure surfaced by a token store backend.
///
/// Stores are pluggable; whatever they fail with is carried through to the
/// caller unmodified. The admission loop never retries a store failure.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    /// Wrap a backend error.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Main error type for tokengate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bucket name could not be resolved to a key
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    /// Rate or capacity was overridden on a derivation that shares the
    /// live token store
    #[error("Rate and capacity are fixed once a store exists; build a new limiter instead")]
    ImmutableRateCapacity,

    /// Token store failure, passed through unmodified
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tokengate operations.
pub type Result<T> = std::result::Result<T, Error>;
