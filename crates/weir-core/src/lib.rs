//! Core types for the weir producer client.
//!
//! This crate defines the vocabulary shared between the producer facade and
//! the transport layer that carries records to the brokers:
//!
//! - Partition/offset/timestamp types with their sentinel values
//! - Record headers
//! - The error-code taxonomy and [`TransportError`]
//! - The [`Transport`] trait: the boundary behind which connection
//!   management, the wire protocol, and partition metadata live
//!
//! The producer client in `weir-client` is written entirely against this
//! boundary; any transport implementation that honors its contract (most
//! importantly: copy borrowed record data before returning from `produce`,
//! and deliver every acknowledgment from a single poll thread) can back it.

pub mod error;
pub mod header;
pub mod serde_utils;
pub mod transport;
pub mod types;

pub use error::{ErrorCode, TransportError};
pub use header::{Header, Headers};
pub use transport::{
    AckHandler, DeliveryAck, ErrorHandler, GroupMetadata, LogHandler, LogLevel, LogMessage,
    StatsHandler, Transport, TransportRecord, TOKEN_NONE,
};
pub use types::{
    Offset, Partition, PersistenceStatus, Timestamp, TimestampType, TopicPartition,
    TopicPartitionOffset,
};
