//! Bucket identifiers and key resolution.

use std::fmt;

use crate::error::{Error, Result};

/// Name of the bucket a limiter consumes from unless told otherwise.
pub const DEFAULT_BUCKET: &[u8] = b"default";

/// A user-supplied bucket identifier: text or raw bytes.
///
/// Resolution is deterministic: text is UTF-8 encoded, bytes pass through
/// unchanged, so `"api"` and `b"api"` name the same bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketName {
    /// Human-readable name, encoded to bytes on resolution.
    Text(String),
    /// Raw key bytes, used as given.
    Bytes(Vec<u8>),
}

impl BucketName {
    /// Resolve the name into a canonical [`BucketKey`].
    ///
    /// Empty names are rejected: an empty key would silently collide every
    /// call site that forgot to set one.
    pub fn resolve(&self) -> Result<BucketKey> {
        let bytes = match self {
            BucketName::Text(text) => text.as_bytes(),
            BucketName::Bytes(bytes) => bytes.as_slice(),
        };

        if bytes.is_empty() {
            return Err(Error::InvalidBucketName(
                "bucket name must not be empty".to_string(),
            ));
        }

        Ok(BucketKey(bytes.to_vec()))
    }
}

impl From<&str> for BucketName {
    fn from(text: &str) -> Self {
        BucketName::Text(text.to_string())
    }
}

impl From<String> for BucketName {
    fn from(text: String) -> Self {
        BucketName::Text(text)
    }
}

impl From<&[u8]> for BucketName {
    fn from(bytes: &[u8]) -> Self {
        BucketName::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for BucketName {
    fn from(bytes: Vec<u8>) -> Self {
        BucketName::Bytes(bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for BucketName {
    fn from(bytes: &[u8; N]) -> Self {
        BucketName::Bytes(bytes.to_vec())
    }
}

/// A canonical key identifying one rate-limited bucket.
///
/// Two keys are equal iff their byte content is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey(Vec<u8>);

impl BucketKey {
    /// The key every limiter falls back to.
    pub fn default_key() -> Self {
        BucketKey(DEFAULT_BUCKET.to_vec())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}
