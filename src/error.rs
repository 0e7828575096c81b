//! Error types returned by the client facade

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::transport::SessionError;
use thiserror::Error;

/// Errors returned by [`crate::Client`] operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Failed to connect after {attempts} attempt(s): {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: SessionError,
    },

    #[error("Client is not connected")]
    NotConnected,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Failed to encode message: {0}")]
    EncodeFailed(#[source] CodecError),

    #[error("Failed to publish to '{topic}': {source}")]
    PublishFailed {
        topic: String,
        #[source]
        source: SessionError,
    },

    #[error("Failed to subscribe to '{filter}': {source}")]
    SubscribeFailed {
        filter: String,
        #[source]
        source: SessionError,
    },

    #[error("Failed to unsubscribe from '{filter}': {source}")]
    UnsubscribeFailed {
        filter: String,
        #[source]
        source: SessionError,
    },
}

impl ClientError {
    /// Whether the caller can retry the failed operation on the same client
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ClientError::InvalidConfig(_))
    }
}

/// Result alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
