#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod backplane;
pub mod error;
pub mod handle;

#[doc(inline)]
pub use crate::backplane::{RedisBackplane, RedisBackplaneBuilder};
pub use crate::error::Error;
#[doc(inline)]
pub use crate::handle::{RedisHandle, RedisHandleBuilder};
