//! EventQueue - bounded per-client event queue
//!
//! Many producers (every sensor the client subscribed to), one consumer.
//! Built on a bounded `async_channel`, so the same queue can be drained from
//! a blocking thread or from an async task.

use std::sync::Arc;

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use contracts::{DropPolicy, Event, EventsConfig};
use tracing::{trace, warn};

use crate::metrics::QueueMetrics;

/// Subscriber queue
pub struct EventQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    policy: DropPolicy,
    metrics: Arc<QueueMetrics>,
}

impl EventQueue {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            metrics: Arc::new(QueueMetrics::new()),
        }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::new(config.queue_capacity, config.drop_policy)
    }

    /// Enqueue `event`. Returns `false` if it was dropped.
    ///
    /// A terminal event always gets in; with a full queue the oldest event
    /// makes room for it.
    pub fn push(&self, event: Event) -> bool {
        if event.is_terminal() || self.policy == DropPolicy::DropOldest {
            return self.force_push(event);
        }

        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics.inc_pushed();
                true
            }
            Err(TrySendError::Full(event)) => {
                self.metrics.inc_dropped();
                observability::record_event_dropped();
                warn!(sensor = event.sensor, event_type = ?event.event_type(), "queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn force_push(&self, event: Event) -> bool {
        match self.tx.force_send(event) {
            Ok(displaced) => {
                self.metrics.inc_pushed();
                if let Some(old) = displaced {
                    self.metrics.inc_dropped();
                    observability::record_event_dropped();
                    warn!(sensor = old.sensor, event_type = ?old.event_type(), "queue full, oldest event dropped");
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Pop without blocking.
    pub fn try_pop(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => {
                self.metrics.inc_popped();
                Some(event)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Block the calling thread until an event arrives.
    ///
    /// Returns `None` only once the queue is terminated and drained.
    pub fn wait_pop(&self) -> Option<Event> {
        let event = self.rx.recv_blocking().ok()?;
        self.metrics.inc_popped();
        Some(event)
    }

    /// Async counterpart of [`Self::wait_pop`].
    pub async fn next(&self) -> Option<Event> {
        let event = self.rx.recv().await.ok()?;
        self.metrics.inc_popped();
        Some(event)
    }

    /// Stop accepting events and release every waiter.
    ///
    /// Events already queued can still be popped.
    pub fn terminate(&self) {
        if self.tx.close() {
            trace!(pending = self.rx.len(), "event queue terminated");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or_default()
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.tx.close();
    }
}
