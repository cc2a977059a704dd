//! Background acknowledgment pump.
//!
//! A dedicated OS thread repeatedly drives the transport's event queue,
//! accumulates the served-event count and wakes callers blocked in
//! `Producer::poll`. The loop is cancelled cooperatively and joined before
//! the transport is released, never the other way around.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};
use weir_core::{ErrorCode, Transport, TransportError};

/// Shared state between the poll loop and blocked `Producer::poll` callers.
pub(crate) struct PollSync {
    pub served: Mutex<usize>,
    pub wake: Condvar,
}

impl PollSync {
    pub fn new() -> Self {
        Self {
            served: Mutex::new(0),
            wake: Condvar::new(),
        }
    }
}

/// A captured failure from a user-supplied handler, re-raised to the error
/// handler at the next poll or flush opportunity and then cleared. Handler
/// failures must never propagate into the transport's callback machinery.
pub(crate) struct HandlerErrorSlot(Mutex<Option<String>>);

impl HandlerErrorSlot {
    pub fn new() -> Self {
        Self(Mutex::new(None))
    }

    pub fn record(&self, message: String) {
        *self.0.lock() = Some(message);
    }

    pub fn take(&self) -> Option<String> {
        self.0.lock().take()
    }
}

pub(crate) type SharedErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// The running background pump.
pub(crate) struct PollLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollLoop {
    /// Spawns the pump thread. `slice` bounds each blocking poll so the stop
    /// flag is observed promptly.
    pub fn spawn(
        client_id: &str,
        transport: Arc<dyn Transport>,
        sync: Arc<PollSync>,
        slice: Duration,
        handler_error: Arc<HandlerErrorSlot>,
        error_handler: Option<SharedErrorHandler>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread_name = format!("{client_id}-poll");

        let handle = std::thread::Builder::new().name(thread_name).spawn(move || {
            debug!("poll loop started");
            while !stop_flag.load(Ordering::Relaxed) {
                let served = transport.poll(slice);

                if let Some(message) = handler_error.take() {
                    if let Some(handler) = &error_handler {
                        handler(&TransportError::new(ErrorCode::Application, message));
                    } else {
                        warn!(%message, "dropping captured handler error: no error handler registered");
                    }
                }

                if served > 0 {
                    let mut count = sync.served.lock();
                    *count += served;
                    sync.wake.notify_all();
                }
            }
            debug!("poll loop stopped");
        })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Cancels the loop and joins the thread.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
