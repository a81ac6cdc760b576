//! Synchronous request coordinator
//!
//! Turns the asynchronous frame stream into blocking request/response calls.
//! One caller at a time may wait for a reply; the delivery thread publishes
//! replies into a shared slot and signals a [`Fence`].
//!
//! Three flags arbitrate the hand-over:
//! - `busy` is owned by the caller for the whole request.
//! - `waiting` opens the slot to publishers. It is raised only once the slot
//!   holds the new request and the fence is re-armed, and lowered before the
//!   caller leaves.
//! - `publishing` is held by whoever touches the slot: the publisher while
//!   filling it, or the caller while arming or giving up.
//!
//! A publish that finds nobody waiting, or a reply for another property, is
//! dropped so a late reply can never complete a later request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytemuck::Pod;
use contracts::{PropertyTag, ZenError, ZenResult};
use tracing::{debug, warn};

use crate::communicator::Communicator;
use crate::fence::Fence;

/// Default reply timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Ack,
    Data,
}

#[derive(Debug)]
struct Slot {
    property: PropertyTag,
    expect: Expect,
    /// Reply capacity in bytes
    capacity: usize,
    reply: Option<ZenResult<Vec<u8>>>,
    /// A reply for another property arrived while waiting
    mismatched: bool,
}

impl Slot {
    fn idle() -> Self {
        Self {
            property: 0,
            expect: Expect::Ack,
            capacity: 0,
            reply: None,
            mismatched: false,
        }
    }
}

pub struct SyncedCommunicator {
    communicator: Arc<Communicator>,
    busy: AtomicBool,
    waiting: AtomicBool,
    publishing: AtomicBool,
    slot: Mutex<Slot>,
    fence: Fence,
    timeout: Duration,
}

/// Caller exit path: excludes publishers, re-arms the fence, then frees the
/// coordinator for the next caller.
struct WaitGuard<'a>(&'a SyncedCommunicator);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let this = self.0;
        while this.publishing.swap(true, Ordering::AcqRel) {
            thread::yield_now();
        }
        this.fence.reset();
        this.slot().reply = None;
        this.waiting.store(false, Ordering::Release);
        this.publishing.store(false, Ordering::Release);
        this.busy.store(false, Ordering::Release);
    }
}

impl SyncedCommunicator {
    pub fn new(communicator: Arc<Communicator>) -> Self {
        Self::with_timeout(communicator, DEFAULT_IO_TIMEOUT)
    }

    pub fn with_timeout(communicator: Arc<Communicator>, timeout: Duration) -> Self {
        Self {
            communicator,
            busy: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            publishing: AtomicBool::new(false),
            slot: Mutex::new(Slot::idle()),
            fence: Fence::new(),
            timeout,
        }
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send without expecting a reply.
    pub fn send_and_dont_wait(&self, address: u8, function: u8, payload: &[u8]) -> ZenResult<()> {
        self.communicator.send(address, function, payload)
    }

    /// Send a request and wait for the device's ack or nack.
    pub fn send_and_wait_for_ack(
        &self,
        address: u8,
        function: u8,
        property: PropertyTag,
        payload: &[u8],
    ) -> ZenResult<()> {
        self.request(address, function, property, payload, Expect::Ack, 0)
            .map(|_| ())
    }

    /// Send a request and copy the array reply into `out`.
    ///
    /// Returns the number of elements written.
    pub fn send_and_wait_for_array<T: Pod>(
        &self,
        address: u8,
        function: u8,
        property: PropertyTag,
        payload: &[u8],
        out: &mut [T],
    ) -> ZenResult<usize> {
        let capacity = std::mem::size_of_val(out);
        let reply = self.request(address, function, property, payload, Expect::Data, capacity)?;
        let element = std::mem::size_of::<T>();
        if element == 0 || reply.len() % element != 0 {
            return Err(ZenError::IoMsgCorrupt);
        }
        let count = reply.len() / element;
        if count > out.len() {
            return Err(ZenError::BufferTooSmall);
        }
        bytemuck::cast_slice_mut::<T, u8>(&mut out[..count]).copy_from_slice(&reply);
        Ok(count)
    }

    /// Send a request and wait for a single typed value.
    pub fn send_and_wait_for_result<T: Pod>(
        &self,
        address: u8,
        function: u8,
        property: PropertyTag,
        payload: &[u8],
    ) -> ZenResult<T> {
        let size = std::mem::size_of::<T>();
        let reply = self.request(address, function, property, payload, Expect::Data, size)?;
        if reply.len() != size {
            return Err(ZenError::IoMsgCorrupt);
        }
        Ok(bytemuck::pod_read_unaligned(&reply))
    }

    fn request(
        &self,
        address: u8,
        function: u8,
        property: PropertyTag,
        payload: &[u8],
        expect: Expect,
        capacity: usize,
    ) -> ZenResult<Vec<u8>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!(property, function, "request rejected, another one is outstanding");
            observability::record_request_busy();
            return Err(ZenError::IoBusy);
        }
        let _guard = WaitGuard(self);

        self.arm(Slot {
            property,
            expect,
            capacity,
            reply: None,
            mismatched: false,
        });

        let started = Instant::now();
        self.communicator.send(address, function, payload)?;
        let reply = self.wait_for_reply(property, function);
        observability::record_request_latency(started.elapsed().as_secs_f64());
        reply
    }

    /// Install the request and re-arm the fence before any publisher may see
    /// it. A reply still in flight for the previous request is either done
    /// before this runs or finds `waiting` lowered and is dropped.
    fn arm(&self, slot: Slot) {
        while self.publishing.swap(true, Ordering::AcqRel) {
            thread::yield_now();
        }
        *self.slot() = slot;
        self.fence.reset();
        self.waiting.store(true, Ordering::Release);
        self.publishing.store(false, Ordering::Release);
    }

    fn wait_for_reply(&self, property: PropertyTag, function: u8) -> ZenResult<Vec<u8>> {
        if !self.fence.wait_for(self.timeout) && !self.second_chance() {
            let mismatched = self.slot().mismatched;
            warn!(property, function, mismatched, "request timed out");
            observability::record_request_timeout();
            return Err(if mismatched {
                ZenError::IoUnexpectedFunction
            } else {
                ZenError::IoTimeout
            });
        }
        self.slot().reply.take().unwrap_or(Err(ZenError::Unknown))
    }

    /// Called after a timeout. If a publisher is mid-flight, wait for it to
    /// finish instead of reporting a timeout. Returns whether a reply landed.
    fn second_chance(&self) -> bool {
        if !self.publishing.swap(true, Ordering::AcqRel) {
            self.publishing.store(false, Ordering::Release);
            return self.fence.is_terminated();
        }
        loop {
            if self.fence.is_terminated() {
                return true;
            }
            if !self.publishing.load(Ordering::Acquire) {
                // the publisher terminates before it lets go of the flag
                return self.fence.is_terminated();
            }
            thread::yield_now();
        }
    }

    fn try_publish(&self) -> bool {
        if self.publishing.swap(true, Ordering::AcqRel) {
            return false;
        }
        if !self.waiting.load(Ordering::Acquire) {
            self.publishing.store(false, Ordering::Release);
            return false;
        }
        true
    }

    fn finish_publish(&self, reply: Option<ZenResult<Vec<u8>>>) {
        if let Some(reply) = reply {
            self.slot().reply = Some(reply);
            self.fence.terminate();
        }
        self.publishing.store(false, Ordering::Release);
    }

    /// Deliver an ack (`Ok`) or nack (`Err`).
    ///
    /// Acks carry no property, so they complete any ack request. A nack also
    /// fails an outstanding data request.
    pub fn publish_ack(&self, _property: PropertyTag, result: ZenResult<()>) {
        if !self.try_publish() {
            return;
        }
        let reply = {
            let mut slot = self.slot();
            match (slot.expect, result) {
                (Expect::Ack, result) => Some(result.map(|_| Vec::new())),
                (Expect::Data, Err(error)) => Some(Err(error)),
                (Expect::Data, Ok(())) => {
                    slot.mismatched = true;
                    None
                }
            }
        };
        self.finish_publish(reply);
    }

    /// Deliver an array reply.
    pub fn publish_array<T: Pod>(&self, property: PropertyTag, result: ZenResult<&[T]>) {
        if !self.try_publish() {
            return;
        }
        let reply = {
            let mut slot = self.slot();
            if slot.expect != Expect::Data || slot.property != property {
                slot.mismatched = true;
                None
            } else {
                Some(result.and_then(|values| {
                    let bytes: &[u8] = bytemuck::cast_slice(values);
                    if bytes.len() > slot.capacity {
                        Err(ZenError::BufferTooSmall)
                    } else {
                        Ok(bytes.to_vec())
                    }
                }))
            }
        };
        self.finish_publish(reply);
    }

    /// Deliver a single typed value.
    pub fn publish_result<T: Pod>(&self, property: PropertyTag, result: ZenResult<T>) {
        if !self.try_publish() {
            return;
        }
        let reply = {
            let mut slot = self.slot();
            if slot.expect != Expect::Data || slot.property != property {
                slot.mismatched = true;
                None
            } else {
                Some(result.map(|value| bytemuck::bytes_of(&value).to_vec()))
            }
        };
        self.finish_publish(reply);
    }

    /// Whether a caller is currently waiting for a reply.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use contracts::Framing;

    fn coordinator(timeout_ms: u64) -> (Arc<MockTransport>, Arc<SyncedCommunicator>) {
        let transport = MockTransport::new();
        let communicator = Communicator::new(transport.clone(), Framing::Zensync);
        let synced = Arc::new(SyncedCommunicator::with_timeout(
            communicator,
            Duration::from_millis(timeout_ms),
        ));
        (transport, synced)
    }

    /// Publish from another thread once the request has been sent.
    fn reply_later(
        transport: &Arc<MockTransport>,
        synced: &Arc<SyncedCommunicator>,
        publish: impl FnOnce(&SyncedCommunicator) + Send + 'static,
    ) -> thread::JoinHandle<()> {
        let transport = transport.clone();
        let synced = synced.clone();
        thread::spawn(move || {
            while transport.sent_bytes().is_empty() {
                thread::yield_now();
            }
            publish(&synced);
        })
    }

    #[test]
    fn test_ack() {
        let (transport, synced) = coordinator(2000);
        let publisher = reply_later(&transport, &synced, |s| s.publish_ack(0, Ok(())));
        assert_eq!(synced.send_and_wait_for_ack(0, 6, 0, &[]), Ok(()));
        publisher.join().unwrap();
        assert!(!synced.is_waiting());
    }

    #[test]
    fn test_nack_surfaces_firmware_error() {
        let (transport, synced) = coordinator(2000);
        let publisher = reply_later(&transport, &synced, |s| {
            s.publish_ack(0, Err(ZenError::FwFunctionFailed))
        });
        assert_eq!(
            synced.send_and_wait_for_result::<u32>(0, 42, 42, &[]),
            Err(ZenError::FwFunctionFailed)
        );
        publisher.join().unwrap();
    }

    #[test]
    fn test_result_and_array() {
        let (transport, synced) = coordinator(2000);
        let publisher = reply_later(&transport, &synced, |s| s.publish_result(42, Ok(3u32)));
        assert_eq!(synced.send_and_wait_for_result::<u32>(0, 42, 42, &[]), Ok(3));
        publisher.join().unwrap();

        transport.clear_sent();
        let publisher = reply_later(&transport, &synced, |s| {
            s.publish_array(30, Ok(&[1.0f32, 2.0, 3.0][..]))
        });
        let mut out = [0f32; 9];
        assert_eq!(synced.send_and_wait_for_array(0, 30, 30, &[], &mut out), Ok(3));
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
        publisher.join().unwrap();
    }

    #[test]
    fn test_buffer_too_small() {
        let (transport, synced) = coordinator(2000);
        let publisher = reply_later(&transport, &synced, |s| {
            s.publish_array(90, Ok(&b"LPMS-IG1-RS232"[..]))
        });
        let mut out = [0u8; 4];
        assert_eq!(
            synced.send_and_wait_for_array(0, 90, 90, &[], &mut out),
            Err(ZenError::BufferTooSmall)
        );
        publisher.join().unwrap();
    }

    #[test]
    fn test_timeout_and_stale_reply_dropped() {
        let (_transport, synced) = coordinator(20);
        assert_eq!(synced.send_and_wait_for_ack(0, 6, 0, &[]), Err(ZenError::IoTimeout));

        // nobody waits any more
        synced.publish_ack(0, Ok(()));
        assert!(!synced.fence.is_terminated());
    }

    #[test]
    fn test_mismatched_property_reported() {
        let (transport, synced) = coordinator(50);
        let publisher = reply_later(&transport, &synced, |s| s.publish_result(41, Ok(1u32)));
        assert_eq!(
            synced.send_and_wait_for_result::<u32>(0, 42, 42, &[]),
            Err(ZenError::IoUnexpectedFunction)
        );
        publisher.join().unwrap();
    }

    #[test]
    fn test_second_request_is_busy() {
        let (transport, synced) = coordinator(2000);
        let first = {
            let synced = synced.clone();
            thread::spawn(move || synced.send_and_wait_for_ack(0, 6, 0, &[]))
        };
        while transport.sent_bytes().is_empty() {
            thread::yield_now();
        }
        assert_eq!(synced.send_and_wait_for_ack(0, 7, 0, &[]), Err(ZenError::IoBusy));

        synced.publish_ack(0, Ok(()));
        assert_eq!(first.join().unwrap(), Ok(()));
        assert_eq!(transport.sent_bytes().len(), 1);
    }

    #[test]
    fn test_late_ack_cannot_complete_next_request() {
        let (transport, synced) = coordinator(2000);
        for round in 0..50u32 {
            transport.clear_sent();
            let publisher = reply_later(&transport, &synced, |s| s.publish_ack(0, Ok(())));
            assert_eq!(synced.send_and_wait_for_ack(0, 6, 0, &[]), Ok(()));
            publisher.join().unwrap();

            // the finished request's ack keeps arriving until the next one is on the wire
            transport.clear_sent();
            let publisher = {
                let transport = transport.clone();
                let synced = synced.clone();
                thread::spawn(move || {
                    while transport.sent_bytes().is_empty() {
                        synced.publish_ack(0, Ok(()));
                    }
                    synced.publish_result(42, Ok(round));
                })
            };
            assert_eq!(synced.send_and_wait_for_result::<u32>(0, 42, 42, &[]), Ok(round));
            publisher.join().unwrap();
        }
        assert!(!synced.is_waiting());
    }

    #[test]
    fn test_wrong_size_result_is_corrupt() {
        let (transport, synced) = coordinator(2000);
        let publisher = reply_later(&transport, &synced, |s| s.publish_result(42, Ok(1u16)));
        assert_eq!(
            synced.send_and_wait_for_result::<u32>(0, 42, 42, &[]),
            Err(ZenError::IoMsgCorrupt)
        );
        publisher.join().unwrap();
    }
}
