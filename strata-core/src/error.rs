//! Validation errors for item and key construction.

use thiserror::Error;

/// Error raised when an item, key or expiration fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// The cache key is an empty string.
    #[error("cache key must not be empty")]
    EmptyKey,

    /// The region is present but empty.
    #[error("cache region must not be empty")]
    EmptyRegion,

    /// An absolute or sliding expiration was given a zero timeout.
    #[error("{0} expiration requires a non-zero timeout")]
    ZeroTimeout(&'static str),
}
