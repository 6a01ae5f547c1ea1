//! Pipeline error types
//!
//! Every failure in the pipeline is terminal at the component where it happens:
//! it is logged with its component, topic and reason and never propagated far
//! enough to stop the process. [`PipelineError::component`] supplies the
//! component label used in those log lines.

use crate::senml::{DecodeError, EncodeError};
use crate::sensor::ValidationError;
use crate::storage::StorageError;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported payload format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed payload on topic '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },

    #[error("Transport unavailable: {message}")]
    TransportUnavailable { message: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StorageError),

    #[error("Transport error: {0}")]
    TransportError(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Invalid sensor setup: {0}")]
    Validation(#[from] ValidationError),

    #[error("Encoding failed: {0}")]
    Encode(EncodeError),

    #[error("Decoding failed: {0}")]
    Decode(#[from] DecodeError),
}

impl From<EncodeError> for PipelineError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::UnsupportedFormat(tag) => Self::UnsupportedFormat(tag),
            other => Self::Encode(other),
        }
    }
}

impl PipelineError {
    /// Create malformed payload error
    pub fn malformed_payload<T: Into<String>, R: Into<String>>(topic: T, reason: R) -> Self {
        Self::MalformedPayload {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create transport unavailable error
    pub fn transport_unavailable<S: Into<String>>(message: S) -> Self {
        Self::TransportUnavailable {
            message: message.into(),
        }
    }

    /// Component label attached to log lines for this error
    pub fn component(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) | Self::Encode(_) => "encoder",
            Self::Decode(_) => "decoder",
            Self::MalformedPayload { .. } => "broker",
            Self::TransportUnavailable { .. } | Self::TransportError(_) => "transport",
            Self::PersistenceFailure(_) => "storage",
            Self::ConfigError(_) => "config",
            Self::Validation(_) => "sensor",
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
