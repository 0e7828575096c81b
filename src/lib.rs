//! MQTT Session - supervised publish/subscribe client
//!
//! A client facade over a single MQTT 3.1.1 broker connection.
//!
//! # Overview
//!
//! This crate provides:
//! - Connection establishment with a bounded, configurable retry policy
//! - Connection state tracking driven by transport callbacks
//! - Configured QoS and retain flag applied to every publish and subscribe
//! - Encode-on-publish and decode-on-deliver through a pluggable codec
//! - TOML configuration with TLS, credentials, last will and persistence
//! - An in-memory loopback transport for tests
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_session::{ClientConfig, JsonCodec, Codec, Message, QosLevel};
//! use serde_json::json;
//!
//! let config = ClientConfig::new("tcp://localhost:1883", "t1");
//! assert_eq!(config.qos, QosLevel::ExactlyOnce);
//!
//! let mut message = Message::new("device", "twin", "Read", json!({"on": true}));
//! message.build_router("device", "", "twin", "twin", "Read");
//!
//! let codec = JsonCodec::<Message>::new();
//! let payload = codec.encode(&message).unwrap();
//! assert_eq!(codec.decode(&payload).unwrap(), message);
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use client::{Backoff, Client, ConnectionState, RetryPolicy};
pub use codec::{Codec, CodecError, JsonCodec};
pub use config::{ClientConfig, ConfigError, LastWillConfig, PersistenceMode, TlsSection};
pub use error::{ClientError, ClientResult};
pub use observability::{ClientMetrics, MetricsSnapshot};
pub use protocol::*;
pub use transport::SessionError;
