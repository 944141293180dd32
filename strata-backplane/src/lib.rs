#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod backplane;
pub mod error;
pub mod memory;
pub mod message;

pub use backplane::{Backplane, SharedBackplane};
pub use error::{BackplaneError, BackplaneResult};
pub use memory::InProcessBackplane;
pub use message::{BackplaneMessage, BackplaneOp};
