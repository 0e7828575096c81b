//! MQTT 3.1.1 transport built on rumqttc
//!
//! - [`connection`] - session options to rumqttc settings
//! - [`message_handler`] - pure event routing
//! - [`acks`] - request/acknowledgment correlation
//! - [`session`] - the connected session and its background tasks
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_session::{Client, ClientConfig};
//!
//! # tokio_test::block_on(async {
//! let client: Client<mqtt_session::protocol::Message> =
//!     Client::new(ClientConfig::new("tcp://localhost:1883", "edgeNode1"))?;
//! client.start().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod acks;
pub mod connection;
pub mod message_handler;
pub mod session;

pub use acks::{AckKind, AckTracker};
pub use connection::{configure_mqtt_options, to_mqtt_qos};
pub use message_handler::{EventRoute, MessageHandler};
pub use session::{MqttConnector, MqttSession};
