//! Value serialization for byte-backed handles.
//!
//! In-process handles store [`CacheItem`](strata_core::CacheItem)s directly;
//! handles backed by a remote store keep the value as an opaque byte blob and
//! delegate the conversion to a [`Serializer`]. Two implementations are
//! provided:
//!
//! - [`BincodeSerializer`] — compact binary, recommended for production
//! - [`JsonSerializer`] — human-readable, convenient for debugging
//!
//! Primitive numeric, boolean, byte-array and string values round-trip
//! unchanged through both.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Serialization or deserialization failure.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The value could not be encoded.
    #[error("value serialization failed: {0}")]
    Encode(Box<dyn std::error::Error + Send>),

    /// The stored bytes could not be decoded.
    #[error("value deserialization failed: {0}")]
    Decode(Box<dyn std::error::Error + Send>),
}

/// Encoder/decoder between cache values and byte blobs.
///
/// Handles that require bytes are generic over their serializer, so the
/// chosen format is part of the handle's type, the way a store's value
/// format is configured at construction time.
pub trait Serializer: Clone + Send + Sync + 'static {
    /// Encodes a value to bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes, SerializeError>;

    /// Decodes a value from bytes.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializeError>;
}

/// Human-readable JSON serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes, SerializeError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| SerializeError::Encode(Box::new(e)))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializeError> {
        serde_json::from_slice(bytes).map_err(|e| SerializeError::Decode(Box::new(e)))
    }
}

/// Fast, compact binary serialization.
///
/// Produces the smallest output of the provided formats. Not human-readable.
/// Uses bincode's standard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes, SerializeError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map(Bytes::from)
            .map_err(|e| SerializeError::Encode(Box::new(e)))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializeError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| SerializeError::Decode(Box::new(e)))
    }
}
