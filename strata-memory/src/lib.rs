#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod builder;
mod handle;

pub use builder::MemoryHandleBuilder;
pub use handle::MemoryHandle;
