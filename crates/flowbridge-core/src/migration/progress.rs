//! Progress reporting and cancellation.
//!
//! Callbacks run on a dedicated dispatcher thread fed by a bounded channel.
//! The migration loop never waits on a callback: when the channel is full
//! the event is dropped and counted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

/// Events buffered between the migration loop and the dispatcher.
const CHANNEL_CAPACITY: usize = 64;

/// One progress notification, sent after each batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Table being migrated.
    pub table: String,
    /// Zero-based index of the batch just processed.
    pub batch_index: usize,
    /// Batches in the table.
    pub total_batches: usize,
    /// Records processed so far in the table.
    pub records_processed: usize,
    /// Human-readable message.
    pub message: String,
}

/// Caller-supplied progress callback.
pub type ProgressCallback = Box<dyn Fn(&ProgressEvent) + Send + 'static>;

/// Delivery statistics, returned by [`ProgressReporter::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStats {
    /// Events handed to the callback.
    pub delivered: u64,
    /// Events dropped because the dispatcher was behind.
    pub dropped: u64,
    /// The dispatcher did not drain within the timeout.
    pub timed_out: bool,
}

/// Non-blocking progress dispatcher.
pub struct ProgressReporter {
    sender: Option<SyncSender<ProgressEvent>>,
    done: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
    delivered: Arc<AtomicU64>,
    dropped: u64,
    timeout: Duration,
}

impl ProgressReporter {
    /// Start a dispatcher thread for `callback`.
    pub fn spawn(callback: ProgressCallback, timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<ProgressEvent>(CHANNEL_CAPACITY);
        let (done_tx, done_rx) = mpsc::channel();
        let delivered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&delivered);

        let spawned = std::thread::Builder::new()
            .name("flowbridge-progress".to_string())
            .spawn(move || {
                for event in receiver {
                    callback(&event);
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => Self {
                sender: Some(sender),
                done: Some(done_rx),
                handle: Some(handle),
                delivered,
                dropped: 0,
                timeout,
            },
            Err(e) => {
                warn!(error = %e, "could not start progress dispatcher, progress disabled");
                Self::disabled()
            }
        }
    }

    /// A reporter that discards every event.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            done: None,
            handle: None,
            delivered: Arc::new(AtomicU64::new(0)),
            dropped: 0,
            timeout: Duration::ZERO,
        }
    }

    /// Queue an event without blocking.
    pub fn report(&mut self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            // The callback panicked; stop dispatching.
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                self.sender = None;
            }
        }
    }

    /// Close the channel and wait up to the timeout for queued events.
    pub fn finish(mut self) -> ProgressStats {
        self.sender = None;
        let mut timed_out = false;

        if let Some(done) = self.done.take() {
            match done.recv_timeout(self.timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if let Some(handle) = self.handle.take() {
                        let _ = handle.join();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(timeout_ms = self.timeout.as_millis() as u64, "progress dispatcher still busy, detaching");
                    timed_out = true;
                }
            }
        }

        ProgressStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped,
            timed_out,
        }
    }
}

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect after the in-flight batch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
