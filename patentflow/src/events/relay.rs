//! Bounded relay from the pipeline's execution context to a blocking caller.

use super::ProgressSink;
use crate::cancellation::CancellationToken;
use crate::core::ProgressEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const FULL_QUEUE_BACKOFF: Duration = Duration::from_millis(5);

/// Counters for relay backpressure.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    emitted: AtomicU64,
    full_waits: AtomicU64,
    dropped: AtomicU64,
}

impl RelayMetrics {
    fn record_emit(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_full(&self) {
        self.full_waits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of events placed on the queue.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of times a send found the queue full.
    #[must_use]
    pub fn full_waits(&self) -> u64 {
        self.full_waits.load(Ordering::Relaxed)
    }

    /// Number of events that never reached the queue.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the drop rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_rate(&self) -> f64 {
        let emitted = self.emitted();
        let dropped = self.dropped();
        let total = emitted + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }

    /// Converts metrics to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "emitted": self.emitted(),
            "full_waits": self.full_waits(),
            "dropped": self.dropped(),
            "drop_rate_percent": (self.drop_rate() * 100.0).round() / 100.0
        })
    }
}

/// Producer half of the relay queue.
///
/// `emit` preserves every event while the caller keeps reading: on a full
/// queue it backs off and retries, giving up only once the run is cancelled
/// or the receiver is gone. `try_emit` drops the event when the queue is full.
#[derive(Clone)]
pub struct RelaySink {
    tx: SyncSender<ProgressEvent>,
    token: CancellationToken,
    metrics: Arc<RelayMetrics>,
}

impl std::fmt::Debug for RelaySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySink")
            .field("token", &self.token)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Creates a relay queue holding at most `capacity` undelivered events.
#[must_use]
pub fn relay(capacity: usize, token: CancellationToken) -> (RelaySink, Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let sink = RelaySink {
        tx,
        token,
        metrics: Arc::new(RelayMetrics::default()),
    };
    (sink, rx)
}

impl RelaySink {
    /// Returns the shared metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl ProgressSink for RelaySink {
    async fn emit(&self, event: ProgressEvent) {
        let mut pending = event;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => {
                    self.metrics.record_emit();
                    return;
                }
                Err(TrySendError::Full(event)) => {
                    self.metrics.record_full();
                    if self.token.is_cancelled() {
                        self.metrics.record_drop();
                        return;
                    }
                    pending = event;
                    tokio::time::sleep(FULL_QUEUE_BACKOFF).await;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.metrics.record_drop();
                    return;
                }
            }
        }
    }

    fn try_emit(&self, event: ProgressEvent) {
        match self.tx.try_send(event) {
            Ok(()) => self.metrics.record_emit(),
            Err(TrySendError::Full(event)) => {
                self.metrics.record_full();
                self.metrics.record_drop();
                warn!(kind = event.kind(), "relay queue full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => self.metrics.record_drop(),
        }
    }
}
