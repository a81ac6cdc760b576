//! RelayHandle - runs an event sink behind an isolated queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{Event, EventSink};

use crate::metrics::RelayMetrics;

/// Handle to a running relay worker
pub struct RelayHandle {
    /// Sink name
    name: String,
    /// Channel to send events to worker
    tx: mpsc::Sender<Event>,
    /// Shared metrics
    metrics: Arc<RelayMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl RelayHandle {
    /// Create a new RelayHandle and spawn the worker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: EventSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(RelayMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            relay_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Hand an event to the worker without blocking.
    ///
    /// Returns false if the queue is full (event dropped)
    pub fn try_send(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    relay = %self.name,
                    sensor = event.sensor,
                    "Relay queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(relay = %self.name, "Relay worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the relay worker, flushing what is queued
    #[instrument(name = "relay_handle_shutdown", skip(self))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(relay = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(relay = %self.name, "RelayHandle shutdown complete");
    }
}

#[instrument(
    name = "relay_worker_loop",
    skip(sink, rx, metrics),
    fields(relay = %name)
)]
async fn relay_worker<S: EventSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Event>,
    metrics: Arc<RelayMetrics>,
    name: String,
) {
    debug!(relay = %name, "Relay worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => metrics.inc_write_count(),
            Err(e) => {
                metrics.inc_failure_count();
                error!(
                    relay = %name,
                    sensor = event.sensor,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(relay = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(relay = %name, error = %e, "Close failed on shutdown");
    }

    debug!(relay = %name, "Relay worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, EventPayload, ImuSample};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl EventSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _event: &Event) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn imu_event(frame_count: i32) -> Event {
        Event::new(
            1,
            0,
            EventPayload::Imu(ImuSample {
                frame_count,
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_relay_handle_basic() {
        let write_count = Arc::new(AtomicU64::new(0));
        let sink = MockSink {
            name: "test".to_string(),
            write_count: Arc::clone(&write_count),
            should_fail: false,
            delay_ms: 0,
        };

        let handle = RelayHandle::spawn(sink, 10);
        for i in 0..5 {
            assert!(handle.try_send(imu_event(i)));
        }

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_relay_handle_queue_full() {
        let sink = MockSink {
            name: "slow".to_string(),
            write_count: Arc::new(AtomicU64::new(0)),
            should_fail: false,
            delay_ms: 100,
        };

        let handle = RelayHandle::spawn(sink, 2);
        for i in 0..10 {
            handle.try_send(imu_event(i));
        }

        assert!(handle.metrics().dropped_count() > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_handle_failure_isolation() {
        let sink = MockSink {
            name: "failing".to_string(),
            write_count: Arc::new(AtomicU64::new(0)),
            should_fail: true,
            delay_ms: 0,
        };

        let handle = RelayHandle::spawn(sink, 10);
        for i in 0..3 {
            handle.try_send(imu_event(i));
        }

        sleep(Duration::from_millis(50)).await;
        assert!(handle.metrics().failure_count() > 0);

        handle.shutdown().await;
    }
}
