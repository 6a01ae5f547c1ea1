//! Observability for the telemetry pipeline
//!
//! Structured logging is the only operator-facing surface: every dropped,
//! ignored or failed message is reported through `tracing` with its component
//! and topic.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat, LogSettings};

// Span macros for structured logging
pub use logging::{ingest_span, mqtt_span, sensor_span, storage_span};
