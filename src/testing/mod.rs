//! Test doubles
//!
//! An in-memory broker and transport plus codec mocks, so client behavior
//! can be exercised without a running MQTT broker.

pub mod loopback;
pub mod mocks;

pub use loopback::{LoopbackBroker, LoopbackConnector, LoopbackSession, PublishedRecord};
pub use mocks::{CountingCodec, FailingCodec};
