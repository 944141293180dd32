//! Error types for Redis handle and backplane operations.
//!
//! All errors convert into [`HandleError`] or
//! [`BackplaneError`](strata_backplane::BackplaneError) for uniform handling
//! across store implementations.

use redis::RedisError;
use strata_backplane::BackplaneError;
use strata_core::ItemError;
use strata_handle::HandleError;

/// Error type for Redis-backed components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client.
    ///
    /// This includes connection failures, protocol errors, authentication
    /// failures, and command execution errors.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// A stored entry is missing fields or holds values that cannot be
    /// parsed back into an item.
    #[error("malformed cache entry: {0}")]
    MalformedEntry(&'static str),

    /// Invalid configuration passed to the builder.
    #[error(transparent)]
    Item(#[from] ItemError),
}

impl From<Error> for HandleError {
    fn from(error: Error) -> Self {
        match &error {
            Error::Redis(redis_error) if redis_error.is_io_error() => {
                HandleError::Connection(Box::new(error))
            }
            _ => HandleError::Internal(Box::new(error)),
        }
    }
}

impl From<Error> for BackplaneError {
    fn from(error: Error) -> Self {
        BackplaneError::Connection(Box::new(error))
    }
}
