//! Error types for handle operations.

use strata_core::ItemError;
use thiserror::Error;

use crate::serialize::SerializeError;

/// Error type for handle operations.
///
/// Groups the failures a backing store can surface so callers can tell a
/// broken store apart from bad input. Absent entries are not errors: reads
/// return `None`, removals return `false`.
#[derive(Debug, Error)]
pub enum HandleError {
    /// Internal handle error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send>),

    /// Network interaction error.
    ///
    /// Errors occurring during communication with remote stores.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send>),

    /// Value serialization or deserialization error.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Invalid item, key or expiration passed into a handle operation.
    #[error(transparent)]
    Item(#[from] ItemError),
}

/// Result type for handle operations.
pub type HandleResult<T> = Result<T, HandleError>;
