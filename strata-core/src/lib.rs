#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod error;
pub mod expiration;
pub mod item;
pub mod key;
pub mod update;

pub use error::ItemError;
pub use expiration::Expiration;
pub use item::CacheItem;
pub use key::EntryKey;
pub use update::{UpdateFn, UpdateOutcome};
