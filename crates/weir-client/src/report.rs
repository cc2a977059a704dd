//! Typed produce messages and delivery results.

use crate::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use weir_core::{Headers, Offset, Partition, PersistenceStatus, Timestamp, TopicPartition};

// ============================================================================
// Message
// ============================================================================

/// A typed record to be produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<K, V> {
    pub key: K,
    pub value: V,
    /// Must be [`Timestamp::DEFAULT`] or of kind `CreateTime`.
    pub timestamp: Timestamp,
    pub headers: Option<Headers>,
}

impl<K, V> Message<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            timestamp: Timestamp::DEFAULT,
            headers: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }
}

// ============================================================================
// Delivery results
// ============================================================================

/// The outcome of one produced record.
///
/// `timestamp`, `headers`, `status`, `key` and `value` are populated only
/// when selected by the producer's delivery-report field mask; the key and
/// value are the original typed inputs cached at produce time, never
/// re-derived from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult<K, V> {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
    pub timestamp: Option<Timestamp>,
    pub headers: Option<Headers>,
    pub status: Option<PersistenceStatus>,
    pub key: Option<K>,
    pub value: Option<V>,
}

impl<K, V> DeliveryResult<K, V> {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// A produce failure carrying the result placeholder (unset offset for
/// synchronous failures) so the caller can inspect what failed to send.
#[derive(Debug)]
pub struct ProduceError<K, V> {
    pub error: Error,
    pub result: DeliveryResult<K, V>,
}

impl<K, V> ProduceError<K, V> {
    pub(crate) fn new(error: Error, result: DeliveryResult<K, V>) -> Self {
        Self { error, result }
    }
}

impl<K, V> fmt::Display for ProduceError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> std::error::Error for ProduceError<K, V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// What a delivery ultimately resolved to.
pub type DeliveryOutcome<K, V> = Result<DeliveryResult<K, V>, ProduceError<K, V>>;

// ============================================================================
// Delivery future
// ============================================================================

/// The future returned by `Producer::send`.
///
/// Dropping it cancels the *wait*, not the delivery: the record stays in
/// flight, the eventual acknowledgment resolves as a no-op, and the
/// correlation state is still released. If the producer is disposed while
/// the delivery is outstanding, the future resolves with a
/// [`Error::Purged`] produce error.
#[derive(Debug)]
pub struct DeliveryFuture<K, V> {
    state: FutureState<K, V>,
}

#[derive(Debug)]
enum FutureState<K, V> {
    Pending {
        rx: oneshot::Receiver<DeliveryOutcome<K, V>>,
        topic: String,
        partition: Partition,
    },
    // Boxed so the future stays Unpin regardless of K and V.
    Ready(Option<Box<DeliveryResult<K, V>>>),
}

impl<K, V> DeliveryFuture<K, V> {
    pub(crate) fn pending(
        rx: oneshot::Receiver<DeliveryOutcome<K, V>>,
        topic: String,
        partition: Partition,
    ) -> Self {
        Self {
            state: FutureState::Pending {
                rx,
                topic,
                partition,
            },
        }
    }

    /// An already-resolved future, used when delivery reports are disabled.
    pub(crate) fn ready(result: DeliveryResult<K, V>) -> Self {
        Self {
            state: FutureState::Ready(Some(Box::new(result))),
        }
    }

    fn purged(topic: String, partition: Partition) -> ProduceError<K, V> {
        ProduceError::new(
            Error::Purged,
            DeliveryResult {
                topic,
                partition,
                offset: Offset::UNSET,
                timestamp: None,
                headers: None,
                status: None,
                key: None,
                value: None,
            },
        )
    }

    /// Blocks the current thread until the delivery resolves.
    ///
    /// Must not be called from within an async runtime; `await` the future
    /// instead.
    pub fn wait(self) -> DeliveryOutcome<K, V> {
        match self.state {
            FutureState::Ready(slot) => {
                Ok(*slot.expect("DeliveryFuture waited on after completion"))
            }
            FutureState::Pending {
                rx,
                topic,
                partition,
            } => rx
                .blocking_recv()
                .unwrap_or_else(|_| Err(Self::purged(topic, partition))),
        }
    }
}

impl<K, V> Future for DeliveryFuture<K, V> {
    type Output = DeliveryOutcome<K, V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FutureState::Ready(slot) => {
                let result = slot.take().expect("DeliveryFuture polled after completion");
                Poll::Ready(Ok(*result))
            }
            FutureState::Pending {
                rx,
                topic,
                partition,
            } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => {
                    let topic = std::mem::take(topic);
                    Poll::Ready(Err(Self::purged(topic, *partition)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
