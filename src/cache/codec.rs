//! Serialization strategies for cached values
//!
//! A codec turns a computed value into the opaque bytes stored under a cache
//! key and back. `decode(encode(v)) == v` must hold for every supported value.
//! Decoding failures are always reported as
//! [`CacheError::DeserializationError`] so that a corrupt entry is never
//! mistaken for a valid cached value.

use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Pluggable encode/decode pair
pub trait Codec: Send + Sync + Clone + fmt::Debug + 'static {
    /// Encode a value into bytes
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`Codec::encode`]
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Format version written in front of every bincode payload
pub const BINCODE_FORMAT_VERSION: u8 = 1;

/// Compact binary encoding via `bincode` (default)
///
/// Payloads carry a one-byte format header; entries written by another format
/// version fail to decode instead of producing garbage.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let payload = bincode::serialize(value)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.push(BINCODE_FORMAT_VERSION);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match bytes.split_first() {
            Some((&BINCODE_FORMAT_VERSION, payload)) => bincode::deserialize(payload)
                .map_err(|e| CacheError::DeserializationError(e.to_string())),
            Some((version, _)) => Err(CacheError::DeserializationError(format!(
                "unsupported bincode format version {} (expected {})",
                version, BINCODE_FORMAT_VERSION
            ))),
            None => Err(CacheError::DeserializationError(
                "empty payload".to_string(),
            )),
        }
    }
}

/// Human-readable JSON encoding via `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::DeserializationError(e.to_string()))
    }
}
