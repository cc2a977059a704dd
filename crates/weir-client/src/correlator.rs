//! Delivery correlator.
//!
//! The correlator is an arena mapping opaque integer tokens to in-flight
//! delivery state. The transport only ever sees the integer, never a
//! reference: once an entry has been removed from the map its token is
//! inert, which rules out use-after-free and double-completion by
//! construction.
//!
//! Every registered token is consumed by exactly one of
//! [`Correlator::resolve_and_remove`] (the delivery callback),
//! [`Correlator::abandon`] (the synchronous enqueue failed, no ack will ever
//! arrive) or [`Correlator::drain`] (facade teardown). `HashMap::remove`
//! returning ownership is what enforces the exactly-once release.

use crate::config::ReportFields;
use crate::error::Error;
use crate::report::{DeliveryResult, ProduceError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::trace;
use weir_core::{DeliveryAck, TOKEN_NONE};

/// One in-flight delivery, boxed into the arena.
///
/// Object-safe so that typed producers with different key/value types can
/// share one arena (dependent producers over a shared transport).
pub(crate) trait PendingDelivery: Send {
    /// Consumes the entry, resolving its completion slot from the ack.
    fn complete(self: Box<Self>, ack: DeliveryAck);
}

/// The completion slot of a pending delivery: either a settable future or a
/// stored callback. Both resolve through the single [`CompletionSink::complete`],
/// so the correlator is agnostic to which one it is releasing.
pub(crate) enum CompletionSink<K, V> {
    Future(oneshot::Sender<Result<DeliveryResult<K, V>, ProduceError<K, V>>>),
    Callback(Box<dyn FnOnce(Result<DeliveryResult<K, V>, ProduceError<K, V>>) + Send>),
}

impl<K: Send, V: Send> CompletionSink<K, V> {
    pub(crate) fn complete(self, outcome: Result<DeliveryResult<K, V>, ProduceError<K, V>>) {
        match self {
            // A closed receiver means the caller cancelled; the send is
            // then a no-op.
            CompletionSink::Future(tx) => {
                let _ = tx.send(outcome);
            }
            CompletionSink::Callback(callback) => callback(outcome),
        }
    }
}

/// Typed in-flight state: the cached topic and (mask-permitting) the original
/// key and value, so the completion never re-derives them from the ack.
pub(crate) struct TypedPending<K, V> {
    pub topic: String,
    pub key: Option<K>,
    pub value: Option<V>,
    pub fields: ReportFields,
    pub sink: CompletionSink<K, V>,
}

impl<K: Send, V: Send> PendingDelivery for TypedPending<K, V> {
    fn complete(self: Box<Self>, ack: DeliveryAck) {
        let this = *self;
        let result = DeliveryResult {
            topic: this.topic,
            partition: ack.partition,
            offset: ack.offset,
            timestamp: this.fields.timestamp.then_some(ack.timestamp),
            headers: if this.fields.headers { ack.headers } else { None },
            status: this.fields.status.then_some(ack.status),
            key: this.key,
            value: this.value,
        };
        let outcome = match ack.error {
            None => Ok(result),
            Some(err) => Err(ProduceError::new(Error::Delivery(err), result)),
        };
        this.sink.complete(outcome);
    }
}

/// Thread-safe token → pending-delivery arena.
///
/// `register` runs on arbitrary producer threads; `resolve_and_remove` runs
/// on the single delivery thread. A plain mutex-guarded map is sufficient
/// here: the hot path is dominated by transport latency, not map contention.
pub(crate) struct Correlator {
    next_token: AtomicU64,
    inflight: Mutex<HashMap<u64, Box<dyn PendingDelivery>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            // Token 0 is TOKEN_NONE; real tokens start at 1 and are never
            // reused.
            next_token: AtomicU64::new(1),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a pending delivery and mints its token. Must be called
    /// before the record is handed to the transport.
    pub fn register(&self, pending: Box<dyn PendingDelivery>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.inflight.lock().insert(token, pending);
        token
    }

    /// Removes and returns the entry for `token`. `TOKEN_NONE` legitimately
    /// resolves to nothing (fire-and-forget records).
    pub fn resolve_and_remove(&self, token: u64) -> Option<Box<dyn PendingDelivery>> {
        if token == TOKEN_NONE {
            return None;
        }
        let pending = self.inflight.lock().remove(&token);
        if pending.is_none() {
            trace!(token, "acknowledgment for unknown correlation token");
        }
        pending
    }

    /// Releases the entry for a record whose synchronous enqueue failed; no
    /// acknowledgment will ever arrive for it.
    pub fn abandon(&self, token: u64) -> Option<Box<dyn PendingDelivery>> {
        if token == TOKEN_NONE {
            return None;
        }
        trace!(token, "abandoning correlation token after enqueue failure");
        self.inflight.lock().remove(&token)
    }

    /// Forcibly releases every entry at teardown, returning how many were
    /// dropped. Dropping a future-backed entry resolves its receiver with a
    /// purged error; a stored callback is never invoked.
    pub fn drain(&self) -> usize {
        let drained: Vec<_> = {
            let mut inflight = self.inflight.lock();
            inflight.drain().collect()
        };
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }
}
