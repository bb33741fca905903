use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{StatusSink, StatusUpdate};
use crate::metrics::{STATUS_OUTBOX_PENDING, STATUS_UPDATES_REJECTED, STATUS_UPDATE_RETRIES};
use crate::retry::RetryConfig;

/// Envelope wrapping an update with the time it was queued
#[derive(Debug, Clone)]
struct QueuedUpdate {
    queued_at: DateTime<Utc>,
    update: StatusUpdate,
}

/// Handle for queueing status updates
///
/// This is cheaply cloneable and can be shared across tasks.
/// Updates are delivered in queue order by the StatusOutboxWriter.
#[derive(Clone)]
pub struct StatusOutbox {
    tx: mpsc::Sender<QueuedUpdate>,
    pending: Arc<AtomicUsize>,
}

impl StatusOutbox {
    /// Queue an update for delivery.
    ///
    /// Waits for queue capacity. Only fails (logged) once the writer is gone.
    pub async fn report(&self, update: StatusUpdate) {
        let asset_id = update.asset_id;
        let queued = QueuedUpdate {
            queued_at: Utc::now(),
            update,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        STATUS_OUTBOX_PENDING.inc();

        if let Err(e) = self.tx.send(queued).await {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            STATUS_OUTBOX_PENDING.dec();
            error!(
                asset_id,
                update = ?e.0.update,
                "Status outbox closed, update not queued"
            );
        }
    }

    /// Updates queued or in delivery.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Background task that delivers queued status updates
pub struct StatusOutboxWriter {
    rx: mpsc::Receiver<QueuedUpdate>,
    sink: Arc<dyn StatusSink>,
    retry: RetryConfig,
    pending: Arc<AtomicUsize>,
}

impl StatusOutboxWriter {
    /// Run the writer, delivering updates until every handle is dropped and
    /// the queue is empty.
    ///
    /// The head of the queue is retried with capped backoff until the sink
    /// accepts or permanently rejects it, so later updates for the same asset
    /// can never overtake an earlier one.
    pub async fn run(mut self) {
        tracing::info!("Status outbox writer started");

        while let Some(queued) = self.rx.recv().await {
            self.deliver(queued).await;
            self.pending.fetch_sub(1, Ordering::SeqCst);
            STATUS_OUTBOX_PENDING.dec();
        }

        tracing::info!("Status outbox writer shutting down");
    }

    async fn deliver(&self, queued: QueuedUpdate) {
        let update = &queued.update;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.sink.deliver(update).await {
                Ok(()) => {
                    debug!(
                        asset_id = update.asset_id,
                        stream_status = ?update.stream_status,
                        attempt,
                        "Status update delivered"
                    );
                    return;
                }
                Err(e) if e.is_transient() => {
                    STATUS_UPDATE_RETRIES.inc();
                    let delay = self.retry.delay_for_attempt(attempt);
                    if attempt % self.retry.max_attempts.max(1) == 0 {
                        warn!(
                            asset_id = update.asset_id,
                            attempt,
                            queued_at = %queued.queued_at,
                            error = %e,
                            "Status update still undelivered, continuing to retry"
                        );
                    } else {
                        debug!(
                            asset_id = update.asset_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Status update failed, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    STATUS_UPDATES_REJECTED.inc();
                    error!(
                        asset_id = update.asset_id,
                        update = ?update,
                        error = %e,
                        "Status update rejected by registry, dropping"
                    );
                    return;
                }
            }
        }
    }
}

/// Create a complete status outbox
///
/// Returns:
/// - `StatusOutbox` - for queueing updates (clone this to share across tasks)
/// - `StatusOutboxWriter` - spawn this as a background task with `tokio::spawn(writer.run())`
pub fn create_status_outbox(
    sink: Arc<dyn StatusSink>,
    capacity: usize,
    retry: RetryConfig,
) -> (StatusOutbox, StatusOutboxWriter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));
    let outbox = StatusOutbox {
        tx,
        pending: Arc::clone(&pending),
    };
    let writer = StatusOutboxWriter {
        rx,
        sink,
        retry,
        pending,
    };
    (outbox, writer)
}
