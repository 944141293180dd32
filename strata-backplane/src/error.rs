//! Error types for backplane transports.

use thiserror::Error;

/// Error type for backplane operations.
#[derive(Debug, Error)]
pub enum BackplaneError {
    /// Transport-level failure while publishing or subscribing.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send>),

    /// A wire message could not be encoded or decoded.
    #[error("backplane message codec error: {0}")]
    Codec(Box<dyn std::error::Error + Send>),

    /// The underlying channel is closed.
    #[error("backplane channel closed")]
    ChannelClosed,
}

/// Result type for backplane operations.
pub type BackplaneResult<T> = Result<T, BackplaneError>;
