//! SubscriberSet - per-sensor fan-out of events to client queues

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::Event;
use tracing::{debug, trace};

use crate::queue::EventQueue;

#[derive(Default)]
struct Inner {
    queues: Vec<Arc<EventQueue>>,
    /// A terminal event went out; nothing follows it.
    sealed: bool,
}

/// Set of subscriber queues owned by one sensor.
///
/// Queues are compared by identity, so subscribing twice is a no-op.
#[derive(Default)]
pub struct SubscriberSet {
    inner: Mutex<Inner>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `queue`. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, queue: Arc<EventQueue>) -> bool {
        let mut inner = self.lock();
        if inner.queues.iter().any(|q| Arc::ptr_eq(q, &queue)) {
            return false;
        }
        inner.queues.push(queue);
        debug!(subscribers = inner.queues.len(), "queue subscribed");
        true
    }

    /// Remove `queue`.
    ///
    /// Returns `true` when this removal left the set empty; the owner is
    /// expected to release the sensor in that case.
    pub fn unsubscribe(&self, queue: &Arc<EventQueue>) -> bool {
        let mut inner = self.lock();
        let before = inner.queues.len();
        inner.queues.retain(|q| !Arc::ptr_eq(q, queue));
        let removed = inner.queues.len() != before;
        if removed {
            debug!(subscribers = inner.queues.len(), "queue unsubscribed");
        }
        removed && inner.queues.is_empty()
    }

    pub fn contains(&self, queue: &Arc<EventQueue>) -> bool {
        self.lock().queues.iter().any(|q| Arc::ptr_eq(q, queue))
    }

    pub fn len(&self) -> usize {
        self.lock().queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queues.is_empty()
    }

    /// Push a copy of `event` onto every queue, in subscription order.
    ///
    /// Returns how many queues accepted it. Once a terminal event has been
    /// published, later events are discarded.
    pub fn publish(&self, event: &Event) -> usize {
        let mut inner = self.lock();
        if inner.sealed {
            trace!(sensor = event.sensor, "event after disconnect discarded");
            return 0;
        }
        if event.is_terminal() {
            inner.sealed = true;
        }

        let delivered = inner
            .queues
            .iter()
            .filter(|queue| queue.push(event.clone()))
            .count();
        observability::record_event_dispatched(delivered);
        delivered
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Take every queue out of the set.
    pub fn drain(&self) -> Vec<Arc<EventQueue>> {
        std::mem::take(&mut self.lock().queues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DisconnectReason, DropPolicy, EventPayload, ListingProgress};

    fn queue() -> Arc<EventQueue> {
        Arc::new(EventQueue::new(8, DropPolicy::DropNewest))
    }

    fn progress() -> Event {
        Event::new(
            1,
            0,
            EventPayload::SensorListingProgress(ListingProgress {
                progress: 1.0,
                complete: true,
            }),
        )
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let set = SubscriberSet::new();
        let q = queue();
        assert!(set.subscribe(q.clone()));
        assert!(!set.subscribe(q.clone()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unsubscribe_reports_empty() {
        let set = SubscriberSet::new();
        let (a, b) = (queue(), queue());
        set.subscribe(a.clone());
        set.subscribe(b.clone());

        assert!(!set.unsubscribe(&a));
        assert!(!set.unsubscribe(&a));
        assert!(set.unsubscribe(&b));
        assert!(!set.unsubscribe(&b));
    }

    #[test]
    fn test_publish_reaches_every_queue() {
        let set = SubscriberSet::new();
        let (a, b) = (queue(), queue());
        set.subscribe(a.clone());
        set.subscribe(b.clone());

        assert_eq!(set.publish(&progress()), 2);
        assert_eq!(a.try_pop(), Some(progress()));
        assert_eq!(b.try_pop(), Some(progress()));
    }

    #[test]
    fn test_nothing_after_disconnect() {
        let set = SubscriberSet::new();
        let q = queue();
        set.subscribe(q.clone());

        let terminal = Event::new(1, 0, EventPayload::SensorDisconnected(DisconnectReason::Released));
        assert_eq!(set.publish(&terminal), 1);
        assert_eq!(set.publish(&progress()), 0);

        assert!(q.try_pop().is_some_and(|e| e.is_terminal()));
        assert!(q.try_pop().is_none());
        assert!(set.is_sealed());
    }
}
