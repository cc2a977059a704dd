//! Shared test harness: an in-memory scripted transport.

// Each integration test binary compiles this module; not every binary uses
// every helper.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weir_core::{
    AckHandler, DeliveryAck, ErrorHandler, GroupMetadata, Headers, LogHandler, LogLevel,
    LogMessage, Offset, Partition, PersistenceStatus, StatsHandler, Timestamp,
    TopicPartitionOffset, Transport, TransportError, TransportRecord,
};

pub const TEST_TIMESTAMP_MS: i64 = 1_700_000_000_000;

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An owned copy of everything a produce call handed to the transport.
#[derive(Debug, Clone)]
pub struct ProducedRecord {
    pub topic: String,
    pub partition: Partition,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp_ms: i64,
    pub headers: Option<Headers>,
    pub token: u64,
}

pub fn success_ack(token: u64, partition: i32, offset: i64) -> DeliveryAck {
    DeliveryAck {
        token,
        partition: Partition(partition),
        offset: Offset(offset),
        error: None,
        status: PersistenceStatus::Persisted,
        timestamp: Timestamp::create_time(TEST_TIMESTAMP_MS),
        headers: None,
    }
}

pub fn error_ack(token: u64, error: TransportError) -> DeliveryAck {
    DeliveryAck {
        token,
        partition: Partition(0),
        offset: Offset::UNSET,
        error: Some(error),
        status: PersistenceStatus::NotPersisted,
        timestamp: Timestamp::DEFAULT,
        headers: None,
    }
}

#[derive(Default)]
struct Handlers {
    delivery: Option<AckHandler>,
    error: Option<ErrorHandler>,
    log: Option<LogHandler>,
    stats: Option<StatsHandler>,
}

/// Scripted in-memory transport.
///
/// Acknowledgments are queued with [`MockTransport::enqueue_ack`] (or
/// automatically with auto-ack) and handed to the registered delivery
/// handler from `poll`/`flush`/`close`, like a real transport's event pump.
pub struct MockTransport {
    handlers: Mutex<Handlers>,
    produced: Mutex<Vec<ProducedRecord>>,
    pending_acks: Mutex<VecDeque<DeliveryAck>>,
    produce_failure: Mutex<Option<TransportError>>,
    txn_failure: Mutex<Option<TransportError>>,
    stuck_remaining: Mutex<Option<usize>>,
    txn_ops: Mutex<Vec<String>>,
    auto_ack: AtomicBool,
    next_offset: AtomicI64,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(Handlers::default()),
            produced: Mutex::new(Vec::new()),
            pending_acks: Mutex::new(VecDeque::new()),
            produce_failure: Mutex::new(None),
            txn_failure: Mutex::new(None),
            stuck_remaining: Mutex::new(None),
            txn_ops: Mutex::new(Vec::new()),
            auto_ack: AtomicBool::new(false),
            next_offset: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue a success acknowledgment automatically for every produce.
    pub fn enable_auto_ack(&self) {
        self.auto_ack.store(true, Ordering::SeqCst);
    }

    /// Make the next produce call fail synchronously.
    pub fn fail_next_produce(&self, error: TransportError) {
        *self.produce_failure.lock() = Some(error);
    }

    /// Make the next transaction operation fail.
    pub fn fail_next_txn(&self, error: TransportError) {
        *self.txn_failure.lock() = Some(error);
    }

    /// Make `flush` always report this many records still in flight.
    pub fn set_stuck_remaining(&self, remaining: usize) {
        *self.stuck_remaining.lock() = Some(remaining);
    }

    pub fn enqueue_ack(&self, ack: DeliveryAck) {
        self.pending_acks.lock().push_back(ack);
    }

    pub fn produced(&self) -> Vec<ProducedRecord> {
        self.produced.lock().clone()
    }

    pub fn last_token(&self) -> u64 {
        self.produced
            .lock()
            .last()
            .map(|r| r.token)
            .expect("nothing produced")
    }

    pub fn txn_ops(&self) -> Vec<String> {
        self.txn_ops.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Invoke the registered log handler, as a transport event would.
    pub fn emit_log(&self, message: &str) {
        if let Some(handler) = &self.handlers.lock().log {
            handler(&LogMessage {
                source: "mock".to_string(),
                level: LogLevel::Info,
                facility: "test".to_string(),
                message: message.to_string(),
            });
        }
    }

    /// Invoke the registered error handler, as a transport event would.
    pub fn emit_error(&self, error: &TransportError) {
        if let Some(handler) = &self.handlers.lock().error {
            handler(error);
        }
    }

    /// Invoke the registered statistics handler, as a transport event would.
    pub fn emit_stats(&self, json: &str) {
        if let Some(handler) = &self.handlers.lock().stats {
            handler(json);
        }
    }

    fn serve_acks(&self) -> usize {
        let mut served = 0;
        loop {
            let ack = self.pending_acks.lock().pop_front();
            let Some(ack) = ack else { break };
            if let Some(handler) = &self.handlers.lock().delivery {
                handler(ack);
            }
            served += 1;
        }
        served
    }

    fn record_txn(&self, op: impl Into<String>) -> Result<(), TransportError> {
        if let Some(error) = self.txn_failure.lock().take() {
            return Err(error);
        }
        self.txn_ops.lock().push(op.into());
        Ok(())
    }
}

impl Transport for MockTransport {
    fn produce(&self, record: TransportRecord<'_>) -> Result<(), TransportError> {
        if let Some(error) = self.produce_failure.lock().take() {
            return Err(error);
        }

        let partition = if record.partition.is_any() {
            Partition(0)
        } else {
            record.partition
        };

        self.produced.lock().push(ProducedRecord {
            topic: record.topic.to_string(),
            partition,
            key: record.key.map(|k| k.to_vec()),
            value: record.value.map(|v| v.to_vec()),
            timestamp_ms: record.timestamp_ms,
            headers: record.headers.cloned(),
            token: record.token,
        });

        if self.auto_ack.load(Ordering::SeqCst) {
            let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
            self.enqueue_ack(success_ack(record.token, partition.0, offset));
        }
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> usize {
        let served = self.serve_acks();
        if served == 0 && !timeout.is_zero() {
            std::thread::sleep(timeout.min(Duration::from_millis(2)));
        }
        served
    }

    fn flush(&self, timeout: Duration) -> usize {
        self.serve_acks();
        match *self.stuck_remaining.lock() {
            Some(remaining) => {
                std::thread::sleep(timeout.min(Duration::from_millis(2)));
                remaining
            }
            None => 0,
        }
    }

    fn init_transactions(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.record_txn("init")
    }

    fn begin_transaction(&self) -> Result<(), TransportError> {
        self.record_txn("begin")
    }

    fn commit_transaction(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.record_txn("commit")
    }

    fn abort_transaction(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.record_txn("abort")
    }

    fn send_offsets_to_transaction(
        &self,
        offsets: &[TopicPartitionOffset],
        group: &GroupMetadata,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.record_txn(format!(
            "send_offsets[{}@{}]",
            offsets.len(),
            group.group_id
        ))
    }

    fn set_delivery_handler(&self, handler: AckHandler) {
        self.handlers.lock().delivery = Some(handler);
    }

    fn set_error_handler(&self, handler: ErrorHandler) {
        self.handlers.lock().error = Some(handler);
    }

    fn set_log_handler(&self, handler: LogHandler) {
        self.handlers.lock().log = Some(handler);
    }

    fn set_stats_handler(&self, handler: StatsHandler) {
        self.handlers.lock().stats = Some(handler);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // A real transport may emit final events while tearing down; the
        // producer's closing flag must keep them away from user code.
        self.emit_log("transport closing");
        self.serve_acks();
    }
}

/// Spin-waits until `condition` holds or the deadline passes.
pub fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
