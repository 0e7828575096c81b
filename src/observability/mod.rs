//! Structured logging and client counters

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{ClientMetrics, MetricsSnapshot};

pub use logging::{connect_span, session_span};
