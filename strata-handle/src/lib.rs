#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod error;
pub mod handle;
pub mod metrics;
pub mod serialize;
pub mod stats;

pub use error::{HandleError, HandleResult};
pub use handle::{CacheHandle, SharedHandle};
pub use serialize::{BincodeSerializer, JsonSerializer, SerializeError, Serializer};
pub use stats::{CacheStats, StatsSnapshot};
