//! Error types for channel frame decoding.

use thiserror::Error;

/// Errors that can occur when decoding channel frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The frame names an event this protocol does not define.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The frame is not valid JSON or its payload does not match the event.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
