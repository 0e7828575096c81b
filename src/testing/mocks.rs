//! Mock collaborators for tests

use crate::codec::{Codec, CodecError};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Codec wrapper that counts calls into the inner codec
pub struct CountingCodec<C> {
    inner: C,
    encodes: Arc<AtomicUsize>,
    decodes: Arc<AtomicUsize>,
}

impl<C> CountingCodec<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            encodes: Arc::new(AtomicUsize::new(0)),
            decodes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl<M, C: Codec<M>> Codec<M> for CountingCodec<C> {
    fn encode(&self, message: &M) -> Result<Bytes, CodecError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(message)
    }

    fn decode(&self, payload: &[u8]) -> Result<M, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(payload)
    }
}

/// Codec whose encode always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCodec;

impl<M> Codec<M> for FailingCodec {
    fn encode(&self, _message: &M) -> Result<Bytes, CodecError> {
        Err(CodecError::EncodeFailed("encoder disabled".to_string()))
    }

    fn decode(&self, _payload: &[u8]) -> Result<M, CodecError> {
        Err(CodecError::DecodeFailed("decoder disabled".to_string()))
    }
}
