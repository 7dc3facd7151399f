//! Messaging error types
//!
//! This module defines the error type shared by the envelope codec, both
//! producer transports and the consumer. Every variant carries enough context
//! (component, operation, topic) to be logged without the call site.

use thiserror::Error;

use super::context::DoneReason;

/// Errors that can occur during messaging operations
#[derive(Error, Debug)]
pub enum MessagingError {
    /// Malformed credentials, topic, or envelope
    #[error("Configuration error: {0}")]
    Config(String),

    /// The underlying client could not be created or subscribed
    #[error("Failed to create {component} client: {reason}")]
    Connection {
        component: &'static str,
        reason: String,
    },

    /// A blocking read or flush exceeded its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The caller's context fired before the operation completed
    #[error("{operation} aborted: {reason}")]
    Cancelled {
        operation: &'static str,
        reason: DoneReason,
    },

    /// The bytes are not a valid envelope
    #[error("Decode error: {0}")]
    Decode(String),

    /// The broker or the proxy rejected the message
    #[error("Delivery to {topic} failed{}: {reason}", status_suffix(.status))]
    Delivery {
        topic: String,
        status: Option<u16>,
        reason: String,
    },

    /// Operation attempted after close
    #[error("{component} is closed")]
    Closed { component: &'static str },

    /// A single-reader operation is already running on this consumer
    #[error("{operation} rejected: consumer is already being read")]
    Busy { operation: &'static str },

    /// Secret lookup failed at the source
    #[error("Secret {id} unavailable: {reason}")]
    Secret { id: String, reason: String },

    /// A worker task failed without returning its result
    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

/// Coarse error category for callers that branch on failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Timeout,
    Cancelled,
    Decode,
    Delivery,
    Closed,
    Busy,
    Secret,
    Internal,
}

impl MessagingError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessagingError::Config(_) => ErrorKind::Config,
            MessagingError::Connection { .. } => ErrorKind::Connection,
            MessagingError::Timeout { .. } => ErrorKind::Timeout,
            MessagingError::Cancelled { .. } => ErrorKind::Cancelled,
            MessagingError::Decode(_) => ErrorKind::Decode,
            MessagingError::Delivery { .. } => ErrorKind::Delivery,
            MessagingError::Closed { .. } => ErrorKind::Closed,
            MessagingError::Busy { .. } => ErrorKind::Busy,
            MessagingError::Secret { .. } => ErrorKind::Secret,
            MessagingError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status carried by a proxy delivery failure
    pub fn status(&self) -> Option<u16> {
        match self {
            MessagingError::Delivery { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::Decode(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Failure reported by an underlying broker client
///
/// The client traits use this instead of `rdkafka::error::KafkaError` so that
/// alternative clients (and test doubles) can report failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClientError(pub String);

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<rdkafka::error::KafkaError> for ClientError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self(err.to_string())
    }
}
