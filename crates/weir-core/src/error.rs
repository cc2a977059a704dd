//! Error codes and the transport error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The closed set of error conditions a producer client distinguishes.
///
/// Local codes describe failures detected inside the client before a record
/// ever reached a broker; the rest are reported back by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The transport's outbound queue is full.
    QueueFull,
    /// The serialized record exceeds the configured maximum size.
    MessageTooLarge,
    /// The destination topic is unknown.
    UnknownTopic,
    /// The destination partition does not exist.
    UnknownPartition,
    /// A request argument was rejected.
    InvalidArgument,
    /// Local: the key serializer failed.
    KeySerialization,
    /// Local: the value serializer failed.
    ValueSerialization,
    /// Local: the record was purged before delivery completed.
    Purged,
    /// The operation did not complete within its timeout.
    TimedOut,
    /// The transport failed (connection loss, protocol error).
    TransportFailure,
    /// Local: an application-supplied handler raised.
    Application,
}

impl ErrorCode {
    /// Whether the condition originated inside the client rather than being
    /// reported by a broker.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ErrorCode::KeySerialization
                | ErrorCode::ValueSerialization
                | ErrorCode::Purged
                | ErrorCode::Application
                | ErrorCode::InvalidArgument
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::QueueFull => "queue full",
            ErrorCode::MessageTooLarge => "message too large",
            ErrorCode::UnknownTopic => "unknown topic",
            ErrorCode::UnknownPartition => "unknown partition",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::KeySerialization => "key serialization failure",
            ErrorCode::ValueSerialization => "value serialization failure",
            ErrorCode::Purged => "purged before delivery",
            ErrorCode::TimedOut => "timed out",
            ErrorCode::TransportFailure => "transport failure",
            ErrorCode::Application => "application handler failure",
        };
        f.write_str(name)
    }
}

/// An error reported by the transport, either synchronously from an enqueue
/// or asynchronously inside a delivery acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: ErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_codes() {
        assert!(ErrorCode::KeySerialization.is_local());
        assert!(ErrorCode::Purged.is_local());
        assert!(!ErrorCode::QueueFull.is_local());
        assert!(!ErrorCode::UnknownTopic.is_local());
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::new(ErrorCode::QueueFull, "outbound queue at capacity");
        assert_eq!(err.to_string(), "queue full: outbound queue at capacity");
    }
}
