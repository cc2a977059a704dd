//! The producer facade.
//!
//! Composes the serialization pipeline, the delivery correlator and the
//! background poll loop over an injected [`Transport`]. Producers are
//! cheaply cloneable (`Arc` inner) and safe to share across threads; all
//! produce variants converge on one core path:
//!
//! 1. validate the timestamp,
//! 2. serialize key then value through the per-thread scratch buffers,
//! 3. register a pending delivery (unless fire-and-forget),
//! 4. hand the record to the transport, abandoning the token again if the
//!    synchronous enqueue fails.
//!
//! Disposal ordering is mandatory: stop and join the poll loop, then mark
//! the facade closing (silencing every handler), then close the transport,
//! then drain the correlator. Releasing the transport first would race its
//! final callbacks against teardown.

use crate::config::{ProducerConfig, ReportFields};
use crate::correlator::{CompletionSink, Correlator, PendingDelivery, TypedPending};
use crate::error::{Error, Result};
use crate::poll::{HandlerErrorSlot, PollLoop, PollSync, SharedErrorHandler};
use crate::report::{DeliveryFuture, DeliveryOutcome, DeliveryResult, Message, ProduceError};
use crate::serialize::{
    AsyncSerializer, ComponentKind, SerializationContext, SerializeDefault, Serializer,
    with_scratch,
};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weir_core::{
    DeliveryAck, ErrorCode, GroupMetadata, Headers, LogMessage, Offset, Timestamp, TimestampType,
    TopicPartition, TopicPartitionOffset, Transport, TransportError, TransportRecord, TOKEN_NONE,
};

const STATE_READY: u8 = 0;
const STATE_DISPOSING: u8 = 1;
const STATE_DISPOSED: u8 = 2;

// ============================================================================
// Serializer roles
// ============================================================================

enum SerializerRole<T> {
    Sync(Arc<dyn Serializer<T>>),
    Async(Arc<dyn AsyncSerializer<T>>),
}

fn resolve_role<T>(
    sync: Option<Arc<dyn Serializer<T>>>,
    asynchronous: Option<Arc<dyn AsyncSerializer<T>>>,
    kind: ComponentKind,
) -> Result<SerializerRole<T>> {
    match (sync, asynchronous) {
        (Some(_), Some(_)) => Err(Error::Config(format!(
            "both a sync and an async {kind} serializer are configured"
        ))),
        (Some(serializer), None) => Ok(SerializerRole::Sync(serializer)),
        (None, Some(serializer)) => Ok(SerializerRole::Async(serializer)),
        (None, None) => Err(Error::Config(format!(
            "no {kind} serializer configured; set one or use build_with_defaults"
        ))),
    }
}

fn wrap_serializer_error(kind: ComponentKind, error: anyhow::Error) -> Error {
    match kind {
        ComponentKind::Key => Error::KeySerialization(error),
        ComponentKind::Value => Error::ValueSerialization(error),
    }
}

fn run_sync_serializer<'a, T>(
    role: &SerializerRole<T>,
    kind: ComponentKind,
    topic: &str,
    headers: Option<&Headers>,
    value: &'a T,
    scratch: &'a mut Vec<u8>,
) -> Result<Option<&'a [u8]>> {
    match role {
        SerializerRole::Sync(serializer) => serializer
            .serialize(value, SerializationContext::new(kind, topic, headers), scratch)
            .map_err(|e| wrap_serializer_error(kind, e)),
        SerializerRole::Async(_) => Err(Error::InvalidOperation(format!(
            "an async {kind} serializer is configured; use send_async"
        ))),
    }
}

async fn serialize_role_async<T>(
    role: &SerializerRole<T>,
    kind: ComponentKind,
    topic: &str,
    headers: Option<&Headers>,
    value: &T,
) -> Result<Option<Vec<u8>>> {
    let ctx = SerializationContext::new(kind, topic, headers);
    let serialized = match role {
        SerializerRole::Async(serializer) => serializer.serialize(value, ctx).await,
        SerializerRole::Sync(serializer) => {
            let mut scratch = Vec::new();
            serializer
                .serialize(value, ctx, &mut scratch)
                .map(|span| span.map(|bytes| bytes.to_vec()))
        }
    };
    serialized.map_err(|e| wrap_serializer_error(kind, e))
}

fn check_timestamp(timestamp: &Timestamp) -> Result<()> {
    if timestamp.kind != TimestampType::CreateTime && !timestamp.is_default() {
        return Err(Error::Config(
            "timestamp must be Timestamp::DEFAULT or of kind CreateTime".to_string(),
        ));
    }
    Ok(())
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A handle onto a running producer's transport-scoped state.
///
/// Building a second producer from a handle yields a *dependent* producer: a
/// differently-typed facade over the same transport, correlation arena and
/// poll machinery. A dependent producer never tears the shared transport
/// down; disposing it only invalidates that facade.
#[derive(Clone)]
pub struct ProducerHandle {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) closing: Arc<AtomicBool>,
    pub(crate) handler_error: Arc<HandlerErrorSlot>,
    pub(crate) poll_sync: Arc<PollSync>,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Producer`].
pub struct ProducerBuilder<K, V> {
    transport: Arc<dyn Transport>,
    config: ProducerConfig,
    shared: Option<ProducerHandle>,
    key_serializer: Option<Arc<dyn Serializer<K>>>,
    async_key_serializer: Option<Arc<dyn AsyncSerializer<K>>>,
    value_serializer: Option<Arc<dyn Serializer<V>>>,
    async_value_serializer: Option<Arc<dyn AsyncSerializer<V>>>,
    error_handler: Option<SharedErrorHandler>,
    log_handler: Option<Arc<dyn Fn(&LogMessage) + Send + Sync>>,
    stats_handler: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    ack_handler: Option<Arc<dyn Fn(&DeliveryAck) + Send + Sync>>,
}

impl<K, V> ProducerBuilder<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// A producer owning `transport`: it pumps acknowledgments (unless
    /// background polling is disabled) and closes the transport on dispose.
    pub fn new(transport: Arc<dyn Transport>, config: ProducerConfig) -> Self {
        Self {
            transport,
            config,
            shared: None,
            key_serializer: None,
            async_key_serializer: None,
            value_serializer: None,
            async_value_serializer: None,
            error_handler: None,
            log_handler: None,
            stats_handler: None,
            ack_handler: None,
        }
    }

    /// A dependent producer borrowing another producer's transport via its
    /// [`ProducerHandle`]. Handlers and polling stay with the owner; only
    /// serializers and the report-field selection apply here.
    pub fn from_handle(handle: ProducerHandle, config: ProducerConfig) -> Self {
        let mut builder = Self::new(Arc::clone(&handle.transport), config);
        builder.shared = Some(handle);
        builder
    }

    pub fn key_serializer(mut self, serializer: impl Serializer<K> + 'static) -> Self {
        self.key_serializer = Some(Arc::new(serializer));
        self
    }

    pub fn async_key_serializer(mut self, serializer: impl AsyncSerializer<K> + 'static) -> Self {
        self.async_key_serializer = Some(Arc::new(serializer));
        self
    }

    pub fn value_serializer(mut self, serializer: impl Serializer<V> + 'static) -> Self {
        self.value_serializer = Some(Arc::new(serializer));
        self
    }

    pub fn async_value_serializer(mut self, serializer: impl AsyncSerializer<V> + 'static) -> Self {
        self.async_value_serializer = Some(Arc::new(serializer));
        self
    }

    /// Handler for transport error events and re-raised handler failures.
    /// Runs on the poll thread; a panic inside it is swallowed.
    pub fn on_error(mut self, handler: impl Fn(&TransportError) + Send + Sync + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Handler for transport log events. Runs on the poll thread; a panic
    /// inside it is swallowed.
    pub fn on_log(mut self, handler: impl Fn(&LogMessage) + Send + Sync + 'static) -> Self {
        self.log_handler = Some(Arc::new(handler));
        self
    }

    /// Handler for statistics events (an opaque JSON document). Runs on the
    /// poll thread; a panic inside it is re-raised to the error handler at
    /// the next poll or flush.
    pub fn on_statistics(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.stats_handler = Some(Arc::new(handler));
        self
    }

    /// Raw hook invoked with every delivery acknowledgment before the typed
    /// completion path runs. Required for the user-state delivery mode.
    pub fn on_delivery_ack(mut self, handler: impl Fn(&DeliveryAck) + Send + Sync + 'static) -> Self {
        self.ack_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Producer<K, V>> {
        let fields = self.config.validate()?;
        let key_role = resolve_role(self.key_serializer, self.async_key_serializer, ComponentKind::Key)?;
        let value_role = resolve_role(
            self.value_serializer,
            self.async_value_serializer,
            ComponentKind::Value,
        )?;

        let dependent = self.shared.is_some();
        let (correlator, closing, handler_error, poll_sync) = match self.shared {
            Some(handle) => (
                handle.correlator,
                handle.closing,
                handle.handler_error,
                handle.poll_sync,
            ),
            None => (
                Arc::new(Correlator::new()),
                Arc::new(AtomicBool::new(false)),
                Arc::new(HandlerErrorSlot::new()),
                Arc::new(PollSync::new()),
            ),
        };

        if !dependent {
            // Every transport callback checks the closing flag before any
            // user code: handlers must never fire once teardown has begun,
            // even for a callback already in flight inside close().
            if let Some(user) = self.error_handler.clone() {
                let closing = Arc::clone(&closing);
                self.transport.set_error_handler(Box::new(move |err| {
                    if closing.load(Ordering::Acquire) {
                        return;
                    }
                    let _ = catch_unwind(AssertUnwindSafe(|| user(err)));
                }));
            }

            if let Some(user) = self.log_handler.clone() {
                let closing = Arc::clone(&closing);
                self.transport.set_log_handler(Box::new(move |event| {
                    if closing.load(Ordering::Acquire) {
                        return;
                    }
                    let _ = catch_unwind(AssertUnwindSafe(|| user(event)));
                }));
            }

            if let Some(user) = self.stats_handler.clone() {
                let closing = Arc::clone(&closing);
                let slot = Arc::clone(&handler_error);
                self.transport.set_stats_handler(Box::new(move |json| {
                    if closing.load(Ordering::Acquire) {
                        return;
                    }
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| user(json))) {
                        slot.record(panic_message(panic));
                    }
                }));
            }

            if self.config.enable_delivery_reports {
                let closing = Arc::clone(&closing);
                let slot = Arc::clone(&handler_error);
                let correlator = Arc::clone(&correlator);
                let raw = self.ack_handler.clone();
                let as_user_state = self.config.delivery_report_as_user_state;
                self.transport.set_delivery_handler(Box::new(move |ack| {
                    if closing.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(handler) = &raw {
                        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&ack))) {
                            slot.record(panic_message(panic));
                        }
                    }
                    if as_user_state {
                        return;
                    }
                    if let Some(pending) = correlator.resolve_and_remove(ack.token) {
                        if let Err(panic) =
                            catch_unwind(AssertUnwindSafe(move || pending.complete(ack)))
                        {
                            slot.record(panic_message(panic));
                        }
                    }
                }));
            }
        }

        let slice = Duration::from_millis(self.config.cancellation_delay_max_ms);
        let poll_loop = if !dependent && self.config.enable_background_poll {
            Some(PollLoop::spawn(
                &self.config.client_id,
                Arc::clone(&self.transport),
                Arc::clone(&poll_sync),
                slice,
                Arc::clone(&handler_error),
                self.error_handler.clone(),
            )?)
        } else {
            None
        };

        info!(
            client_id = %self.config.client_id,
            dependent,
            background_poll = self.config.enable_background_poll,
            delivery_reports = self.config.enable_delivery_reports,
            "producer ready"
        );

        Ok(Producer {
            inner: Arc::new(ProducerInner {
                transport: self.transport,
                config: self.config,
                fields,
                key_role,
                value_role,
                correlator,
                poll_sync,
                poll_loop: Mutex::new(poll_loop),
                handler_error,
                error_handler: self.error_handler,
                owns_transport: !dependent,
                state: AtomicU8::new(STATE_READY),
                closing,
                dispose_called: Mutex::new(false),
            }),
        })
    }
}

impl<K, V> ProducerBuilder<K, V>
where
    K: SerializeDefault + Send + Sync + 'static,
    V: SerializeDefault + Send + Sync + 'static,
{
    /// Like [`build`](Self::build), but falls back to the built-in
    /// serializer for any role without one configured.
    pub fn build_with_defaults(mut self) -> Result<Producer<K, V>> {
        if self.key_serializer.is_none() && self.async_key_serializer.is_none() {
            self.key_serializer = Some(K::default_serializer());
        }
        if self.value_serializer.is_none() && self.async_value_serializer.is_none() {
            self.value_serializer = Some(V::default_serializer());
        }
        self.build()
    }
}

// ============================================================================
// Producer
// ============================================================================

struct ProducerInner<K, V> {
    transport: Arc<dyn Transport>,
    config: ProducerConfig,
    fields: ReportFields,
    key_role: SerializerRole<K>,
    value_role: SerializerRole<V>,
    correlator: Arc<Correlator>,
    poll_sync: Arc<PollSync>,
    poll_loop: Mutex<Option<PollLoop>>,
    handler_error: Arc<HandlerErrorSlot>,
    error_handler: Option<SharedErrorHandler>,
    owns_transport: bool,
    state: AtomicU8,
    closing: Arc<AtomicBool>,
    dispose_called: Mutex<bool>,
}

impl<K, V> ProducerInner<K, V> {
    fn dispose(&self) {
        {
            let mut called = self.dispose_called.lock();
            if *called {
                return;
            }
            *called = true;
        }
        self.state.store(STATE_DISPOSING, Ordering::Release);

        if !self.owns_transport {
            // Borrowed handle: the owner tears the shared transport down.
            self.state.store(STATE_DISPOSED, Ordering::Release);
            debug!(client_id = %self.config.client_id, "dependent producer disposed");
            return;
        }

        // The poll loop uses the transport; it must be joined before the
        // transport is released.
        if let Some(poll_loop) = self.poll_loop.lock().take() {
            poll_loop.stop();
        }

        // From here on no handler fires, even for callbacks close() emits.
        self.closing.store(true, Ordering::Release);
        self.transport.close();

        let drained = self.correlator.drain();
        if drained > 0 {
            warn!(
                client_id = %self.config.client_id,
                drained,
                "abandoned in-flight deliveries at dispose"
            );
        }

        self.state.store(STATE_DISPOSED, Ordering::Release);
        info!(client_id = %self.config.client_id, "producer disposed");
    }
}

impl<K, V> Drop for ProducerInner<K, V> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A typed producer over a partitioned append-only log.
pub struct Producer<K, V> {
    inner: Arc<ProducerInner<K, V>>,
}

impl<K, V> Clone for Producer<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for Producer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("client_id", &self.inner.config.client_id)
            .finish_non_exhaustive()
    }
}

impl<K, V> Producer<K, V>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    /// Number of deliveries currently awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.inner.correlator.len()
    }

    /// A handle for constructing dependent producers over this producer's
    /// transport.
    pub fn handle(&self) -> ProducerHandle {
        ProducerHandle {
            transport: Arc::clone(&self.inner.transport),
            correlator: Arc::clone(&self.inner.correlator),
            closing: Arc::clone(&self.inner.closing),
            handler_error: Arc::clone(&self.inner.handler_error),
            poll_sync: Arc::clone(&self.inner.poll_sync),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.inner.state.load(Ordering::Acquire) == STATE_READY {
            Ok(())
        } else {
            Err(Error::Disposed)
        }
    }

    fn slice(&self) -> Duration {
        Duration::from_millis(self.inner.config.cancellation_delay_max_ms)
    }

    fn surface_handler_error(&self) {
        if let Some(message) = self.inner.handler_error.take() {
            if let Some(handler) = &self.inner.error_handler {
                handler(&TransportError::new(ErrorCode::Application, message));
            }
        }
    }

    /// The synthetic unset-offset result wrapped into synchronous failures
    /// and returned directly when delivery reports are disabled.
    fn synthetic_result(dest: &TopicPartition, message: Message<K, V>) -> DeliveryResult<K, V> {
        DeliveryResult {
            topic: dest.topic.clone(),
            partition: dest.partition,
            offset: Offset::UNSET,
            timestamp: Some(message.timestamp),
            headers: message.headers,
            status: None,
            key: Some(message.key),
            value: Some(message.value),
        }
    }

    fn enqueue_raw(
        &self,
        dest: &TopicPartition,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        timestamp: Timestamp,
        headers: Option<&Headers>,
        token: u64,
    ) -> std::result::Result<(), TransportError> {
        self.inner.transport.produce(TransportRecord {
            topic: &dest.topic,
            partition: dest.partition,
            key,
            value,
            timestamp_ms: timestamp.unix_ms,
            headers,
            token,
        })
    }

    /// Registers `pending` (if any), enqueues, and abandons the token again
    /// if the synchronous enqueue fails: no acknowledgment will ever arrive
    /// for a rejected record.
    fn enqueue_registered(
        &self,
        dest: &TopicPartition,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        timestamp: Timestamp,
        headers: Option<&Headers>,
        pending: Option<Box<dyn PendingDelivery>>,
    ) -> Result<()> {
        let token = match pending {
            Some(pending) => self.inner.correlator.register(pending),
            None => TOKEN_NONE,
        };
        self.enqueue_raw(dest, key, value, timestamp, headers, token)
            .map_err(|err| {
                if token != TOKEN_NONE {
                    drop(self.inner.correlator.abandon(token));
                }
                Error::Enqueue(err)
            })
    }

    fn typed_pending(
        &self,
        dest: &TopicPartition,
        message: &Message<K, V>,
        sink: CompletionSink<K, V>,
    ) -> Box<dyn PendingDelivery> {
        let fields = self.inner.fields;
        Box::new(TypedPending {
            topic: dest.topic.clone(),
            key: fields.key.then(|| message.key.clone()),
            value: fields.value.then(|| message.value.clone()),
            fields,
            sink,
        })
    }

    /// The shared synchronous produce path; all public variants land here.
    fn produce_core(
        &self,
        dest: &TopicPartition,
        message: &Message<K, V>,
        sink: Option<CompletionSink<K, V>>,
    ) -> Result<()> {
        self.ensure_ready()?;
        check_timestamp(&message.timestamp)?;

        with_scratch(|key_buf, value_buf| {
            let headers = message.headers.as_ref();
            let key_bytes = run_sync_serializer(
                &self.inner.key_role,
                ComponentKind::Key,
                &dest.topic,
                headers,
                &message.key,
                key_buf,
            )?;
            let value_bytes = run_sync_serializer(
                &self.inner.value_role,
                ComponentKind::Value,
                &dest.topic,
                headers,
                &message.value,
                value_buf,
            )?;
            let pending = sink.map(|sink| self.typed_pending(dest, message, sink));
            // The scratch-backed spans are consumed by the transport inside
            // this call; the buffers are free for reuse as soon as it
            // returns.
            self.enqueue_registered(
                dest,
                key_bytes,
                value_bytes,
                message.timestamp,
                headers,
                pending,
            )
        })
    }

    /// Produces a record and returns a future resolving to its delivery
    /// result.
    ///
    /// The future never blocks the calling thread; dropping it cancels only
    /// the wait (see [`DeliveryFuture`]). With delivery reports disabled the
    /// returned future is already resolved with an unset offset.
    ///
    /// Synchronous failures (serialization, enqueue rejection) are returned
    /// directly, wrapping the original message with an unset offset.
    pub fn send(
        &self,
        dest: impl Into<TopicPartition>,
        message: Message<K, V>,
    ) -> std::result::Result<DeliveryFuture<K, V>, ProduceError<K, V>> {
        let dest = dest.into();

        if !self.inner.config.enable_delivery_reports {
            return match self.produce_core(&dest, &message, None) {
                Ok(()) => Ok(DeliveryFuture::ready(Self::synthetic_result(&dest, message))),
                Err(error) => Err(ProduceError::new(
                    error,
                    Self::synthetic_result(&dest, message),
                )),
            };
        }

        let (tx, rx) = oneshot::channel();
        match self.produce_core(&dest, &message, Some(CompletionSink::Future(tx))) {
            Ok(()) => Ok(DeliveryFuture::pending(rx, dest.topic, dest.partition)),
            Err(error) => Err(ProduceError::new(
                error,
                Self::synthetic_result(&dest, message),
            )),
        }
    }

    /// Like [`send`](Self::send), but resolves async serializers first.
    /// Works with any mix of sync and async serializers per role.
    pub async fn send_async(
        &self,
        dest: impl Into<TopicPartition>,
        message: Message<K, V>,
    ) -> DeliveryOutcome<K, V> {
        let dest = dest.into();

        if let Err(error) = self.ensure_ready() {
            return Err(ProduceError::new(error, Self::synthetic_result(&dest, message)));
        }
        if let Err(error) = check_timestamp(&message.timestamp) {
            return Err(ProduceError::new(error, Self::synthetic_result(&dest, message)));
        }

        let key_bytes = match serialize_role_async(
            &self.inner.key_role,
            ComponentKind::Key,
            &dest.topic,
            message.headers.as_ref(),
            &message.key,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(error) => {
                return Err(ProduceError::new(error, Self::synthetic_result(&dest, message)))
            }
        };
        let value_bytes = match serialize_role_async(
            &self.inner.value_role,
            ComponentKind::Value,
            &dest.topic,
            message.headers.as_ref(),
            &message.value,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(error) => {
                return Err(ProduceError::new(error, Self::synthetic_result(&dest, message)))
            }
        };

        if !self.inner.config.enable_delivery_reports {
            return match self.enqueue_registered(
                &dest,
                key_bytes.as_deref(),
                value_bytes.as_deref(),
                message.timestamp,
                message.headers.as_ref(),
                None,
            ) {
                Ok(()) => Ok(Self::synthetic_result(&dest, message)),
                Err(error) => Err(ProduceError::new(
                    error,
                    Self::synthetic_result(&dest, message),
                )),
            };
        }

        let (tx, rx) = oneshot::channel();
        let pending = self.typed_pending(&dest, &message, CompletionSink::Future(tx));
        match self.enqueue_registered(
            &dest,
            key_bytes.as_deref(),
            value_bytes.as_deref(),
            message.timestamp,
            message.headers.as_ref(),
            Some(pending),
        ) {
            Ok(()) => DeliveryFuture::pending(rx, dest.topic, dest.partition).await,
            Err(error) => Err(ProduceError::new(
                error,
                Self::synthetic_result(&dest, message),
            )),
        }
    }

    /// Produces a record, invoking `on_delivery` with the outcome when the
    /// acknowledgment arrives. Requires delivery reports to be enabled.
    pub fn produce<F>(
        &self,
        dest: impl Into<TopicPartition>,
        message: Message<K, V>,
        on_delivery: F,
    ) -> std::result::Result<(), ProduceError<K, V>>
    where
        F: FnOnce(DeliveryOutcome<K, V>) + Send + 'static,
    {
        let dest = dest.into();
        if !self.inner.config.enable_delivery_reports {
            return Err(ProduceError::new(
                Error::InvalidOperation(
                    "a delivery handler was specified but delivery reports are disabled"
                        .to_string(),
                ),
                Self::synthetic_result(&dest, message),
            ));
        }
        self.produce_core(
            &dest,
            &message,
            Some(CompletionSink::Callback(Box::new(on_delivery))),
        )
        .map_err(|error| ProduceError::new(error, Self::synthetic_result(&dest, message)))
    }

    /// Fire-and-forget produce: no completion is requested or tracked.
    pub fn produce_forget(
        &self,
        dest: impl Into<TopicPartition>,
        message: Message<K, V>,
    ) -> std::result::Result<(), ProduceError<K, V>> {
        let dest = dest.into();
        self.produce_core(&dest, &message, None)
            .map_err(|error| ProduceError::new(error, Self::synthetic_result(&dest, message)))
    }

    /// Produces a record whose acknowledgment is correlated by the caller's
    /// own opaque `user_state` instead of the typed completion path; the
    /// state comes back verbatim in the raw ack handler. `value: None`
    /// produces an absent value. Requires delivery reports when
    /// `user_state` is not [`TOKEN_NONE`].
    pub fn produce_with_user_state(
        &self,
        dest: impl Into<TopicPartition>,
        key: &K,
        value: Option<&V>,
        user_state: u64,
        timestamp: Timestamp,
        headers: Option<&Headers>,
    ) -> Result<()> {
        let dest = dest.into();
        self.ensure_ready()?;
        if user_state != TOKEN_NONE && !self.inner.config.enable_delivery_reports {
            return Err(Error::InvalidOperation(
                "delivery reports must be enabled to attach user state".to_string(),
            ));
        }
        check_timestamp(&timestamp)?;

        with_scratch(|key_buf, value_buf| {
            let key_bytes = run_sync_serializer(
                &self.inner.key_role,
                ComponentKind::Key,
                &dest.topic,
                headers,
                key,
                key_buf,
            )?;
            let value_bytes = match value {
                Some(value) => run_sync_serializer(
                    &self.inner.value_role,
                    ComponentKind::Value,
                    &dest.topic,
                    headers,
                    value,
                    value_buf,
                )?,
                None => None,
            };
            self.enqueue_raw(&dest, key_bytes, value_bytes, timestamp, headers, user_state)
                .map_err(Error::Enqueue)
        })
    }

    /// Serves delivery callbacks.
    ///
    /// In background-poll mode this blocks up to `timeout` for the loop to
    /// signal served events and returns their count; in manual mode it
    /// drives the transport's event pump directly.
    pub fn poll(&self, timeout: Duration) -> Result<usize> {
        self.ensure_ready()?;
        self.surface_handler_error();

        if !self.inner.config.enable_background_poll && self.inner.owns_transport {
            return Ok(self.inner.transport.poll(timeout));
        }

        let sync = &self.inner.poll_sync;
        let mut served = sync.served.lock();
        if *served == 0 {
            let _ = sync.wake.wait_for(&mut served, timeout);
        }
        let count = *served;
        *served = 0;
        Ok(count)
    }

    /// Drives the transport until nothing is left in flight, in bounded
    /// slices so teardown and handler errors are observed promptly.
    ///
    /// Returns `Ok(0)` once drained (immediately for an idle transport) or
    /// [`Error::FlushTimeout`] reporting the outstanding remainder.
    pub fn flush(&self, timeout: Duration) -> Result<usize> {
        self.ensure_ready()?;
        let slice = self.slice();
        let deadline = Instant::now() + timeout;
        loop {
            let budget = deadline.saturating_duration_since(Instant::now());
            let remaining = self.inner.transport.flush(budget.min(slice));
            self.surface_handler_error();
            if remaining == 0 {
                return Ok(0);
            }
            if Instant::now() >= deadline {
                return Err(Error::FlushTimeout {
                    outstanding: remaining,
                });
            }
        }
    }

    /// Like [`flush`](Self::flush), but runs until `cancel` fires instead of
    /// a deadline; cancellation with records still outstanding is
    /// [`Error::FlushCancelled`].
    pub fn flush_cancellable(&self, cancel: &CancellationToken) -> Result<usize> {
        self.ensure_ready()?;
        let slice = self.slice();
        loop {
            let remaining = self.inner.transport.flush(slice);
            self.surface_handler_error();
            if remaining == 0 {
                return Ok(0);
            }
            if cancel.is_cancelled() {
                return Err(Error::FlushCancelled {
                    outstanding: remaining,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Transactions: sequencing pass-throughs; the transactional log lives
    // entirely in the transport.
    // ------------------------------------------------------------------

    pub fn init_transactions(&self, timeout: Duration) -> Result<()> {
        self.ensure_ready()?;
        self.inner
            .transport
            .init_transactions(timeout)
            .map_err(Error::Transaction)
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.ensure_ready()?;
        self.inner
            .transport
            .begin_transaction()
            .map_err(Error::Transaction)
    }

    pub fn commit_transaction(&self, timeout: Duration) -> Result<()> {
        self.ensure_ready()?;
        self.inner
            .transport
            .commit_transaction(timeout)
            .map_err(Error::Transaction)
    }

    pub fn abort_transaction(&self, timeout: Duration) -> Result<()> {
        self.ensure_ready()?;
        self.inner
            .transport
            .abort_transaction(timeout)
            .map_err(Error::Transaction)
    }

    pub fn send_offsets_to_transaction(
        &self,
        offsets: &[TopicPartitionOffset],
        group: &GroupMetadata,
        timeout: Duration,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.inner
            .transport
            .send_offsets_to_transaction(offsets, group, timeout)
            .map_err(Error::Transaction)
    }

    /// Tears the producer down. Idempotent: every call after the first is a
    /// no-op. Also invoked when the last clone is dropped.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}
