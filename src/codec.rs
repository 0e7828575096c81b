//! Payload codecs
//!
//! A codec turns an application message into wire bytes and back. Codecs are
//! stateless and shared between clients behind an `Arc`.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use thiserror::Error;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode message: {0}")]
    EncodeFailed(String),
    #[error("Failed to decode payload: {0}")]
    DecodeFailed(String),
}

/// Converts between `M` and transport payloads
pub trait Codec<M>: Send + Sync + 'static {
    fn encode(&self, message: &M) -> Result<Bytes, CodecError>;
    fn decode(&self, payload: &[u8]) -> Result<M, CodecError>;
}

/// serde_json codec, usable for any serde message type
pub struct JsonCodec<M = crate::protocol::Message> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for JsonCodec<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<M> Codec<M> for JsonCodec<M>
where
    M: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, message: &M) -> Result<Bytes, CodecError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<M, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
