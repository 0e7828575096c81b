//! Message model, delivery levels and topic rules

pub mod messages;
pub mod qos;
pub mod topics;

pub use messages::*;
pub use qos::*;
pub use topics::*;
