#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod manager;

pub use error::{CacheError, ConfigError};
pub use manager::{TieredCache, TieredCacheBuilder, UpdateMode};

pub use strata_backplane::{
    Backplane, BackplaneError, BackplaneMessage, BackplaneOp, InProcessBackplane, SharedBackplane,
};
pub use strata_core::{CacheItem, EntryKey, Expiration, ItemError, UpdateFn, UpdateOutcome};
pub use strata_handle::{
    BincodeSerializer, CacheHandle, CacheStats, HandleError, HandleResult, JsonSerializer,
    SerializeError, Serializer, SharedHandle, StatsSnapshot,
};

/// The `strata` prelude.
///
/// Provides convenient access to the most commonly used types:
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CacheError, CacheHandle, CacheItem, EntryKey, Expiration, TieredCache, UpdateMode,
        UpdateOutcome,
    };
}
