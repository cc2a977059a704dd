//! Producer client for weir, a partitioned append-only log.
//!
//! The producer takes typed key/value records, serializes them through
//! pluggable [`Serializer`] capabilities, hands them to an injected
//! [`Transport`](weir_core::Transport) and correlates the asynchronous
//! delivery acknowledgments back to the exact in-flight request, resolved
//! as a future, an explicit callback, or not at all (fire-and-forget).
//!
//! # Example
//!
//! ```rust,ignore
//! use weir_client::{Message, ProducerBuilder, ProducerConfig};
//! use std::sync::Arc;
//!
//! # async fn example(transport: Arc<dyn weir_core::Transport>) -> anyhow::Result<()> {
//! let producer = ProducerBuilder::<String, String>::new(transport, ProducerConfig::default())
//!     .build_with_defaults()?;
//!
//! let delivery = producer
//!     .send(("orders", 0), Message::new("key".to_string(), "value".to_string()))
//!     .map_err(|e| anyhow::anyhow!("{e}"))?
//!     .await;
//!
//! match delivery {
//!     Ok(result) => println!("delivered to {} at {}", result.topic_partition(), result.offset),
//!     Err(err) => eprintln!("delivery failed: {err}"),
//! }
//! producer.dispose();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod serialize;

mod correlator;
mod poll;
mod producer;

pub use config::{ProducerConfig, ProducerConfigBuilder, ReportFields};
pub use error::{Error, Result};
pub use producer::{Producer, ProducerBuilder, ProducerHandle};
pub use report::{DeliveryFuture, DeliveryOutcome, DeliveryResult, Message, ProduceError};
pub use serialize::{
    AsyncSerializer, BytesSerializer, ComponentKind, Float32Serializer, Float64Serializer,
    Int32Serializer, Int64Serializer, NullSerializer, Nullable, SerializationContext,
    SerializeDefault, Serializer, Utf8Serializer,
};

// Re-export the transport boundary and shared types for convenience.
pub use weir_core::{
    DeliveryAck, ErrorCode, GroupMetadata, Header, Headers, LogLevel, LogMessage, Offset,
    Partition, PersistenceStatus, Timestamp, TimestampType, TopicPartition, TopicPartitionOffset,
    Transport, TransportError, TransportRecord, TOKEN_NONE,
};
