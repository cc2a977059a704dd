//! The transport boundary.
//!
//! A [`Transport`] owns broker connections, partition metadata, and the wire
//! protocol. The producer client hands it serialized records tagged with an
//! opaque correlation token and later receives a [`DeliveryAck`] carrying the
//! same token from the transport's poll thread.
//!
//! Contract highlights:
//!
//! - `produce` must copy any borrowed data out of the [`TransportRecord`]
//!   before returning; callers are free to reuse the backing buffers
//!   immediately afterwards.
//! - Delivery, error, log and statistics handlers are only ever invoked from
//!   within `poll`, `flush` or `close`, a single thread at a time.
//! - `close` may fire final callbacks as a side effect of teardown.

use crate::error::TransportError;
use crate::header::Headers;
use crate::types::{Offset, Partition, PersistenceStatus, Timestamp, TopicPartitionOffset};
use std::time::Duration;

/// The correlation token value meaning "no caller-visible continuation".
pub const TOKEN_NONE: u64 = 0;

/// A serialized record handed to the transport for enqueueing.
///
/// All borrowed data is only valid for the duration of the `produce` call.
#[derive(Debug, Clone, Copy)]
pub struct TransportRecord<'a> {
    pub topic: &'a str,
    pub partition: Partition,
    /// Serialized key; `None` means an absent key (distinct from empty).
    pub key: Option<&'a [u8]>,
    /// Serialized value; `None` means an absent value (distinct from empty).
    pub value: Option<&'a [u8]>,
    /// Unix milliseconds; `0` lets the broker assign the timestamp.
    pub timestamp_ms: i64,
    pub headers: Option<&'a Headers>,
    /// Opaque correlation token echoed back in the [`DeliveryAck`].
    pub token: u64,
}

/// An asynchronous delivery acknowledgment for one produced record.
///
/// Delivered on the transport's poll thread. The ack carries no topic
/// string; the producer caches the topic alongside its correlation state.
#[derive(Debug, Clone)]
pub struct DeliveryAck {
    /// The token the record was produced with; [`TOKEN_NONE`] if the record
    /// carried no continuation.
    pub token: u64,
    pub partition: Partition,
    pub offset: Offset,
    /// `None` for a successful delivery.
    pub error: Option<TransportError>,
    pub status: PersistenceStatus,
    pub timestamp: Timestamp,
    pub headers: Option<Headers>,
}

/// A log event emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// The transport instance name the event originated from.
    pub source: String,
    pub level: LogLevel,
    /// The transport-internal subsystem (e.g. "broker", "protocol").
    pub facility: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Opaque consumer-group metadata forwarded verbatim into
/// [`Transport::send_offsets_to_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMetadata {
    pub group_id: String,
}

impl GroupMetadata {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }
}

pub type AckHandler = Box<dyn Fn(DeliveryAck) + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(&TransportError) + Send + Sync>;
pub type LogHandler = Box<dyn Fn(&LogMessage) + Send + Sync>;
pub type StatsHandler = Box<dyn Fn(&str) + Send + Sync>;

/// The lower transport layer consumed by the producer client.
pub trait Transport: Send + Sync {
    /// Synchronously enqueues a record for delivery.
    ///
    /// A returned error means the record was rejected outright and no
    /// [`DeliveryAck`] will ever be delivered for its token.
    fn produce(&self, record: TransportRecord<'_>) -> Result<(), TransportError>;

    /// Serves queued callbacks for up to `timeout`, returning the number of
    /// events served.
    fn poll(&self, timeout: Duration) -> usize;

    /// Attempts to drain in-flight records for up to `timeout`, serving
    /// callbacks while doing so; returns the number still in flight.
    fn flush(&self, timeout: Duration) -> usize;

    fn init_transactions(&self, timeout: Duration) -> Result<(), TransportError>;
    fn begin_transaction(&self) -> Result<(), TransportError>;
    fn commit_transaction(&self, timeout: Duration) -> Result<(), TransportError>;
    fn abort_transaction(&self, timeout: Duration) -> Result<(), TransportError>;
    fn send_offsets_to_transaction(
        &self,
        offsets: &[TopicPartitionOffset],
        group: &GroupMetadata,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn set_delivery_handler(&self, handler: AckHandler);
    fn set_error_handler(&self, handler: ErrorHandler);
    fn set_log_handler(&self, handler: LogHandler);
    fn set_stats_handler(&self, handler: StatsHandler);

    /// Begins teardown. May fire final callbacks from the calling thread.
    fn close(&self);
}
