//! Application message model
//!
//! A [`Message`] carries a header (identity and timing), a router (where the
//! message came from and what it asks for) and a free-form JSON content body.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message identity and timing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageHeader {
    /// Message identifier
    pub id: String,
    /// Identifier of the message this one answers, if any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Message routing information
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageRouter {
    pub source: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub target: String,
    pub resource: String,
    pub operation: String,
}

/// Message exchanged through the client
///
/// # Examples
/// ```
/// use mqtt_session::protocol::Message;
/// use serde_json::json;
///
/// let mut msg = Message::default();
/// msg.build_router("device", "", "twin", "twin", "Read")
///     .build_header("12345", 1_700_000_000_000);
/// msg.content = json!({"temperature": 21.5});
///
/// assert_eq!(msg.router.operation, "Read");
/// assert_eq!(msg.header.id, "12345");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub router: MessageRouter,
    #[serde(default)]
    pub content: Value,
}

impl Message {
    /// Create a message with a fresh UUID header stamped with the current time
    pub fn new(
        source: &str,
        resource: &str,
        operation: &str,
        content: impl Into<Value>,
    ) -> Self {
        let mut msg = Self {
            content: content.into(),
            ..Self::default()
        };
        msg.build_header(&Uuid::new_v4().to_string(), now_millis())
            .build_router(source, "", "", resource, operation);
        msg
    }

    /// Set the header id and timestamp, keeping any parent id
    pub fn build_header(&mut self, id: &str, timestamp: i64) -> &mut Self {
        self.header.id = id.to_string();
        self.header.timestamp = timestamp;
        self
    }

    /// Set every router field
    pub fn build_router(
        &mut self,
        source: &str,
        group: &str,
        target: &str,
        resource: &str,
        operation: &str,
    ) -> &mut Self {
        self.router = MessageRouter {
            source: source.to_string(),
            group: group.to_string(),
            target: target.to_string(),
            resource: resource.to_string(),
            operation: operation.to_string(),
        };
        self
    }

    /// Mark this message as a reply to `parent_id`
    pub fn set_parent_id(&mut self, parent_id: &str) -> &mut Self {
        self.header.parent_id = parent_id.to_string();
        self
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
