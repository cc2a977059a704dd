//! Partition, offset and timestamp types with their sentinel values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Partition
// ============================================================================

/// A partition index within a topic.
///
/// [`Partition::ANY`] asks the transport to pick a partition itself (for
/// example via a key hash or a sticky partitioner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition(pub i32);

impl Partition {
    /// Sentinel: let the transport choose the partition.
    pub const ANY: Partition = Partition(-1);

    pub fn is_any(&self) -> bool {
        *self == Partition::ANY
    }
}

impl From<i32> for Partition {
    fn from(index: i32) -> Self {
        Partition(index)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            write!(f, "[Any]")
        } else {
            write!(f, "[{}]", self.0)
        }
    }
}

// ============================================================================
// Offset
// ============================================================================

/// A position within a partition's log.
///
/// [`Offset::UNSET`] marks a record that has no assigned offset: a produce
/// that failed before reaching the broker, or a fire-and-forget result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset(pub i64);

impl Offset {
    /// Sentinel: no offset was assigned.
    pub const UNSET: Offset = Offset(-1001);

    pub fn is_unset(&self) -> bool {
        *self == Offset::UNSET
    }
}

impl From<i64> for Offset {
    fn from(offset: i64) -> Self {
        Offset(offset)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            write!(f, "Unset")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ============================================================================
// Topic + partition addressing
// ============================================================================

/// A (topic, partition) destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: Partition,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: impl Into<Partition>) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.topic, self.partition)
    }
}

impl From<(&str, i32)> for TopicPartition {
    fn from((topic, partition): (&str, i32)) -> Self {
        TopicPartition::new(topic, partition)
    }
}

impl From<&str> for TopicPartition {
    fn from(topic: &str) -> Self {
        TopicPartition::new(topic, Partition::ANY)
    }
}

impl From<String> for TopicPartition {
    fn from(topic: String) -> Self {
        TopicPartition::new(topic, Partition::ANY)
    }
}

/// A (topic, partition, offset) triple, as used for transactional offset
/// hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPartitionOffset {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
}

impl TopicPartitionOffset {
    pub fn new(
        topic: impl Into<String>,
        partition: impl Into<Partition>,
        offset: impl Into<Offset>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
            offset: offset.into(),
        }
    }
}

impl fmt::Display for TopicPartitionOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.topic, self.partition, self.offset)
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// The provenance of a record timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimestampType {
    /// No timestamp available (or: let the broker assign one).
    NotAvailable,
    /// Timestamp set by the producing application.
    CreateTime,
    /// Timestamp assigned by the broker on append.
    LogAppendTime,
}

/// A record timestamp in Unix milliseconds, tagged with its provenance.
///
/// Producers may only supply [`Timestamp::DEFAULT`] (the broker assigns the
/// time) or a [`TimestampType::CreateTime`] value; `LogAppendTime` only ever
/// appears on records read back from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub unix_ms: i64,
    pub kind: TimestampType,
}

impl Timestamp {
    /// Sentinel: the broker assigns the timestamp on append.
    pub const DEFAULT: Timestamp = Timestamp {
        unix_ms: 0,
        kind: TimestampType::NotAvailable,
    };

    /// An application-assigned creation time.
    pub fn create_time(unix_ms: i64) -> Self {
        Self {
            unix_ms,
            kind: TimestampType::CreateTime,
        }
    }

    /// The current wall-clock time as a creation timestamp.
    pub fn now() -> Self {
        Self::create_time(Utc::now().timestamp_millis())
    }

    pub fn is_default(&self) -> bool {
        *self == Timestamp::DEFAULT
    }

    /// The timestamp as a UTC datetime, or `None` when not available.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.kind == TimestampType::NotAvailable {
            return None;
        }
        DateTime::from_timestamp_millis(self.unix_ms)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::DEFAULT
    }
}

// ============================================================================
// Persistence status
// ============================================================================

/// How durably a produced record is known to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceStatus {
    /// The record was never written to the log.
    NotPersisted,
    /// The record may or may not have been written (for example the request
    /// timed out after transmission).
    PossiblyPersisted,
    /// The record was acknowledged as written.
    Persisted,
}
