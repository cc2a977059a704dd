//! Lifecycle integration tests: disposal ordering, poll modes, flush,
//! handler suppression, dependent producers and transactions.

mod common;

use anyhow::Result;
use common::{init_tracing, success_ack, wait_until, MockTransport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weir_client::{
    Error, ErrorCode, GroupMetadata, Message, Producer, ProducerBuilder, ProducerConfig,
    TopicPartitionOffset, TransportError, Utf8Serializer,
};

const AWAIT_TIMEOUT: Duration = Duration::from_secs(2);

fn test_config() -> weir_client::ProducerConfigBuilder {
    ProducerConfig::builder()
        .client_id("lifecycle-producer")
        .cancellation_delay_max_ms(10)
}

fn string_producer(
    transport: Arc<MockTransport>,
    config: ProducerConfig,
) -> Producer<String, String> {
    ProducerBuilder::new(transport, config)
        .build_with_defaults()
        .expect("producer builds")
}

fn message(key: &str, value: &str) -> Message<String, String> {
    Message::new(key.to_string(), value.to_string())
}

// =============================================================================
// DISPOSAL
// =============================================================================

#[test]
fn dispose_is_idempotent_and_rejects_further_operations() {
    init_tracing();
    let transport = MockTransport::new();
    let producer = string_producer(Arc::clone(&transport), test_config().build());

    producer.dispose();
    assert!(transport.is_closed());
    producer.dispose(); // second call is a no-op

    let err = producer.send(("t", 0), message("k", "v")).unwrap_err();
    assert!(matches!(err.error, Error::Disposed));
    assert!(matches!(
        producer.flush(Duration::from_millis(10)),
        Err(Error::Disposed)
    ));
    assert!(matches!(
        producer.poll(Duration::from_millis(10)),
        Err(Error::Disposed)
    ));
    assert!(matches!(producer.begin_transaction(), Err(Error::Disposed)));
}

#[test]
fn no_handler_fires_after_dispose() {
    init_tracing();
    let transport = MockTransport::new();
    let log_calls = Arc::new(AtomicUsize::new(0));
    let error_calls = Arc::new(AtomicUsize::new(0));

    let producer: Producer<String, String> = {
        let log_calls = Arc::clone(&log_calls);
        let error_calls = Arc::clone(&error_calls);
        ProducerBuilder::new(
            Arc::clone(&transport) as Arc<dyn weir_client::Transport>,
            test_config().build(),
        )
        .on_log(move |_| {
            log_calls.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_| {
            error_calls.fetch_add(1, Ordering::SeqCst);
        })
        .build_with_defaults()
        .expect("producer builds")
    };

    // Handlers work while the producer is live.
    transport.emit_log("warming up");
    assert_eq!(log_calls.load(Ordering::SeqCst), 1);

    // dispose() makes the transport emit teardown events internally; none
    // of them may reach user code.
    producer.dispose();
    transport.emit_log("after close");
    transport.emit_error(&TransportError::new(ErrorCode::TransportFailure, "late"));

    assert_eq!(log_calls.load(Ordering::SeqCst), 1);
    assert_eq!(error_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_the_last_clone_disposes() {
    init_tracing();
    let transport = MockTransport::new();
    let producer = string_producer(Arc::clone(&transport), test_config().build());
    let clone = producer.clone();

    drop(producer);
    assert!(!transport.is_closed());

    drop(clone);
    assert!(transport.is_closed());
}

// =============================================================================
// POLL MODES
// =============================================================================

#[test]
fn manual_poll_drives_the_transport_directly() {
    init_tracing();
    let transport = MockTransport::new();
    let config = test_config().enable_background_poll(false).build();
    let producer = string_producer(Arc::clone(&transport), config);

    let (tx, rx) = std::sync::mpsc::channel();
    producer
        .produce(("t", 0), message("k", "v"), move |outcome| {
            let _ = tx.send(outcome);
        })
        .expect("produce succeeds");
    transport.enqueue_ack(success_ack(transport.last_token(), 0, 11));

    // Nothing resolves until the caller pumps.
    assert!(rx.try_recv().is_err());
    let served = producer.poll(Duration::from_millis(100)).unwrap();
    assert_eq!(served, 1);

    let result = rx.recv_timeout(AWAIT_TIMEOUT).unwrap().unwrap();
    assert_eq!(result.offset.0, 11);
}

#[test]
fn background_poll_wakes_blocked_pollers() {
    init_tracing();
    let transport = MockTransport::new();
    let producer = string_producer(Arc::clone(&transport), test_config().build());

    producer
        .produce(("t", 0), message("k", "v"), |_| {})
        .expect("produce succeeds");
    transport.enqueue_ack(success_ack(transport.last_token(), 0, 1));

    // The background loop serves the ack and signals the served count.
    let mut total = 0;
    assert!(wait_until(AWAIT_TIMEOUT, || {
        total += producer.poll(Duration::from_millis(50)).unwrap();
        total > 0
    }));
}

// =============================================================================
// FLUSH
// =============================================================================

#[test]
fn flush_on_a_drained_transport_returns_zero_immediately() {
    init_tracing();
    let transport = MockTransport::new();
    let producer = string_producer(Arc::clone(&transport), test_config().build());

    let start = std::time::Instant::now();
    assert_eq!(producer.flush(Duration::from_secs(5)).unwrap(), 0);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn flush_that_never_drains_times_out_with_the_remainder() {
    init_tracing();
    let transport = MockTransport::new();
    transport.set_stuck_remaining(3);
    let producer = string_producer(Arc::clone(&transport), test_config().build());

    let err = producer.flush(Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, Error::FlushTimeout { outstanding: 3 }));
}

#[test]
fn flush_cancellation_reports_the_remainder() {
    init_tracing();
    let transport = MockTransport::new();
    transport.set_stuck_remaining(2);
    let producer = string_producer(Arc::clone(&transport), test_config().build());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        trigger.cancel();
    });

    let err = producer.flush_cancellable(&cancel).unwrap_err();
    assert!(matches!(err, Error::FlushCancelled { outstanding: 2 }));
    canceller.join().unwrap();
}

// =============================================================================
// HANDLER FAILURE CONTAINMENT
// =============================================================================

#[test]
fn statistics_handler_panic_reaches_the_error_handler_later() {
    init_tracing();
    let transport = MockTransport::new();
    let seen_errors: Arc<Mutex<Vec<TransportError>>> = Arc::new(Mutex::new(Vec::new()));

    let producer: Producer<String, String> = {
        let seen_errors = Arc::clone(&seen_errors);
        ProducerBuilder::new(
            Arc::clone(&transport) as Arc<dyn weir_client::Transport>,
            test_config().build(),
        )
        .on_statistics(|_| panic!("statistics handler exploded"))
        .on_error(move |err| seen_errors.lock().push(err.clone()))
        .build_with_defaults()
        .expect("producer builds")
    };

    // The panic is captured at the callback site, never propagated into the
    // transport...
    transport.emit_stats("{}");

    // ...and re-raised to the error handler at the next poll or flush.
    assert!(wait_until(AWAIT_TIMEOUT, || !seen_errors.lock().is_empty()));
    let seen = seen_errors.lock();
    assert_eq!(seen[0].code, ErrorCode::Application);
    assert!(seen[0].message.contains("statistics handler exploded"));
    drop(seen);

    // The slot is cleared after surfacing: a later flush raises nothing new.
    let before = seen_errors.lock().len();
    producer.flush(Duration::from_millis(20)).unwrap();
    assert_eq!(seen_errors.lock().len(), before);
}

// =============================================================================
// DEPENDENT PRODUCERS
// =============================================================================

#[tokio::test]
async fn dependent_producer_shares_the_transport_without_owning_it() -> Result<()> {
    init_tracing();
    let transport = MockTransport::new();
    let owner = string_producer(Arc::clone(&transport), test_config().build());

    // A differently-typed facade over the owner's transport and arena.
    let dependent: Producer<i64, String> = ProducerBuilder::from_handle(
        owner.handle(),
        test_config().client_id("dependent-producer").build(),
    )
    .build_with_defaults()?;

    let future = dependent
        .send(("t", 0), Message::new(42i64, "dep".to_string()))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    transport.enqueue_ack(success_ack(transport.last_token(), 0, 9));

    // The owner's poll loop resolves the dependent's delivery.
    let result = tokio::time::timeout(AWAIT_TIMEOUT, future).await??;
    assert_eq!(result.offset.0, 9);
    assert_eq!(result.key, Some(42i64));

    // Disposing the dependent leaves the shared transport running.
    dependent.dispose();
    assert!(!transport.is_closed());
    assert!(matches!(
        dependent.begin_transaction(),
        Err(Error::Disposed)
    ));
    owner
        .produce_forget(("t", 0), message("k", "v"))
        .expect("owner unaffected");

    owner.dispose();
    assert!(transport.is_closed());
    Ok(())
}

// =============================================================================
// USER-STATE DELIVERY MODE
// =============================================================================

#[test]
fn user_state_mode_bypasses_the_typed_path() {
    init_tracing();
    let transport = MockTransport::new();
    let seen_states: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let producer: Producer<String, String> = {
        let seen_states = Arc::clone(&seen_states);
        ProducerBuilder::new(
            Arc::clone(&transport) as Arc<dyn weir_client::Transport>,
            test_config().delivery_report_as_user_state(true).build(),
        )
        .on_delivery_ack(move |ack| seen_states.lock().push(ack.token))
        .build_with_defaults()
        .expect("producer builds")
    };

    producer
        .produce_with_user_state(
            ("t", 0),
            &"k".to_string(),
            Some(&"v".to_string()),
            77,
            weir_client::Timestamp::DEFAULT,
            None,
        )
        .expect("produce succeeds");

    // The caller's opaque state travels through untouched.
    assert_eq!(transport.produced()[0].token, 77);
    transport.enqueue_ack(success_ack(77, 0, 1));
    assert!(wait_until(AWAIT_TIMEOUT, || seen_states
        .lock()
        .contains(&77)));

    // Nothing was registered in the correlator for it.
    assert_eq!(producer.in_flight(), 0);
}

#[test]
fn user_state_requires_delivery_reports() {
    init_tracing();
    let transport = MockTransport::new();
    let config = test_config().enable_delivery_reports(false).build();
    let producer = string_producer(Arc::clone(&transport), config);

    let err = producer
        .produce_with_user_state(
            ("t", 0),
            &"k".to_string(),
            None,
            5,
            weir_client::Timestamp::DEFAULT,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));

    // An absent value serializes as absent, not empty.
    producer
        .produce_with_user_state(
            ("t", 0),
            &"k".to_string(),
            None,
            0,
            weir_client::Timestamp::DEFAULT,
            None,
        )
        .expect("token-less produce is fine without reports");
    assert!(transport.produced()[0].value.is_none());
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

#[test]
fn transactions_pass_through_to_the_transport() {
    init_tracing();
    let transport = MockTransport::new();
    let producer = string_producer(Arc::clone(&transport), test_config().build());
    let timeout = Duration::from_secs(1);

    producer.init_transactions(timeout).unwrap();
    producer.begin_transaction().unwrap();
    producer
        .produce_forget(("t", 0), message("k", "v"))
        .unwrap();
    producer
        .send_offsets_to_transaction(
            &[TopicPartitionOffset::new("t", 0, 5i64)],
            &GroupMetadata::new("cg-1"),
            timeout,
        )
        .unwrap();
    producer.commit_transaction(timeout).unwrap();
    producer.begin_transaction().unwrap();
    producer.abort_transaction(timeout).unwrap();

    assert_eq!(
        transport.txn_ops(),
        vec![
            "init".to_string(),
            "begin".to_string(),
            "send_offsets[1@cg-1]".to_string(),
            "commit".to_string(),
            "begin".to_string(),
            "abort".to_string(),
        ]
    );
}

#[test]
fn transaction_failure_maps_to_a_transaction_error() {
    init_tracing();
    let transport = MockTransport::new();
    let producer = string_producer(Arc::clone(&transport), test_config().build());

    transport.fail_next_txn(TransportError::new(ErrorCode::TimedOut, "coordinator slow"));
    let err = producer
        .commit_transaction(Duration::from_millis(10))
        .unwrap_err();
    assert!(matches!(err, Error::Transaction(_)));
    assert_eq!(err.code(), ErrorCode::TimedOut);
}

// =============================================================================
// BUILDER VALIDATION
// =============================================================================

#[test]
fn both_serializers_for_one_role_is_a_config_error() {
    init_tracing();
    let transport = MockTransport::new();

    struct NopAsync;
    #[async_trait::async_trait]
    impl weir_client::AsyncSerializer<String> for NopAsync {
        async fn serialize(
            &self,
            _value: &String,
            _ctx: weir_client::SerializationContext<'_>,
        ) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    let err = ProducerBuilder::<String, String>::new(
        Arc::clone(&transport) as Arc<dyn weir_client::Transport>,
        test_config().build(),
    )
    .key_serializer(Utf8Serializer)
    .async_key_serializer(NopAsync)
    .value_serializer(Utf8Serializer)
    .build()
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn missing_serializer_without_defaults_is_a_config_error() {
    init_tracing();
    let transport = MockTransport::new();
    let err = ProducerBuilder::<String, String>::new(
        Arc::clone(&transport) as Arc<dyn weir_client::Transport>,
        test_config().build(),
    )
    .key_serializer(Utf8Serializer)
    .build()
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("value serializer"));
}

#[test]
fn invalid_field_selection_fails_the_build() {
    init_tracing();
    let transport = MockTransport::new();
    let err = ProducerBuilder::<String, String>::new(
        Arc::clone(&transport) as Arc<dyn weir_client::Transport>,
        test_config().delivery_report_fields("key,bogus").build(),
    )
    .build_with_defaults()
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("bogus"));
}
