//! Transport session abstraction
//!
//! The client facade drives a broker connection through the [`Session`] trait
//! and builds a fresh session for every `start` through a [`Connector`].
//! Production code uses [`mqtt::MqttConnector`]; tests use the loopback
//! transport in [`crate::testing`].

use crate::protocol::{QosLevel, TopicError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;
pub mod options;
pub mod subscriptions;

pub use options::{SessionOptions, TlsMaterial};
pub use subscriptions::SubscriptionTable;

/// Raw inbound delivery callback: `(topic, payload)`
pub type MessageCallback = Arc<dyn Fn(&str, Bytes) + Send + Sync>;

/// Receives connection events from a transport session
///
/// Implementations must tolerate repeated calls of either method.
pub trait ConnectionObserver: Send + Sync {
    /// The session completed a handshake with the broker
    fn on_connect(&self);

    /// An established connection was lost or closed
    fn on_lost(&self, cause: &str);
}

/// Transport session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),

    #[error("No connection acknowledgment within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Request could not be queued: {0}")]
    Request(#[from] rumqttc::ClientError),

    #[error("No acknowledgment within {0:?}")]
    AckTimeout(Duration),

    #[error("Broker rejected subscription to '{0}'")]
    SubscriptionRejected(String),

    #[error(transparent)]
    InvalidTopic(#[from] TopicError),

    #[error("Session closed before the operation completed")]
    Closed,

    #[error("Session is not connected")]
    NotConnected,
}

/// Builds transport sessions
///
/// `create` only prepares the session; no network I/O happens until
/// [`Session::connect`].
pub trait Connector: Send + Sync {
    fn create(&self, options: SessionOptions) -> Result<Arc<dyn Session>, SessionError>;
}

/// One logical broker connection
#[async_trait]
pub trait Session: Send + Sync {
    /// Perform the network handshake
    async fn connect(&self) -> Result<(), SessionError>;

    /// Publish and wait for the acknowledgment matching `qos`
    async fn publish(
        &self,
        topic: &str,
        qos: QosLevel,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), SessionError>;

    /// Register `callback` for topics matching `filter` and wait for SUBACK
    async fn subscribe(
        &self,
        filter: &str,
        qos: QosLevel,
        callback: MessageCallback,
    ) -> Result<(), SessionError>;

    /// Remove the registration for `filter` and wait for UNSUBACK
    async fn unsubscribe(&self, filter: &str) -> Result<(), SessionError>;

    /// Disconnect gracefully, waiting at most `drain_timeout` for in-flight work
    async fn close(&self, drain_timeout: Duration);

    /// Whether the underlying connection is currently open
    fn is_connection_open(&self) -> bool;
}
