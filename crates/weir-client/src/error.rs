use thiserror::Error;
use weir_core::{ErrorCode, TransportError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("producer has been disposed")]
    Disposed,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key serialization failed: {0}")]
    KeySerialization(#[source] anyhow::Error),

    #[error("value serialization failed: {0}")]
    ValueSerialization(#[source] anyhow::Error),

    #[error("enqueue rejected: {0}")]
    Enqueue(#[from] TransportError),

    #[error("delivery failed: {0}")]
    Delivery(TransportError),

    #[error("delivery abandoned before completion")]
    Purged,

    #[error("flush timed out with {outstanding} records outstanding")]
    FlushTimeout { outstanding: usize },

    #[error("flush cancelled with {outstanding} records outstanding")]
    FlushCancelled { outstanding: usize },

    #[error("transaction operation failed: {0}")]
    Transaction(TransportError),

    #[error("handler raised: {0}")]
    Application(String),
}

impl Error {
    /// The error-code category this error maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Config(_) | Error::InvalidOperation(_) => ErrorCode::InvalidArgument,
            Error::Disposed => ErrorCode::InvalidArgument,
            Error::Io(_) => ErrorCode::TransportFailure,
            Error::KeySerialization(_) => ErrorCode::KeySerialization,
            Error::ValueSerialization(_) => ErrorCode::ValueSerialization,
            Error::Enqueue(e) | Error::Delivery(e) | Error::Transaction(e) => e.code,
            Error::Purged => ErrorCode::Purged,
            Error::FlushTimeout { .. } | Error::FlushCancelled { .. } => ErrorCode::TimedOut,
            Error::Application(_) => ErrorCode::Application,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
