//! Framed communicator
//!
//! Owns the transport and the active codec. Outbound requests are encoded
//! with the current framing; inbound bytes are parsed into frames and handed
//! to a single subscriber in wire order.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use contracts::{Frame, Framing, Transport, ZenResult};
use tracing::{debug, trace};

use crate::codec::{self, FrameCodec, FrameParser};
use crate::config::IngestionMetrics;

/// Receiver of decoded frames.
///
/// Called on the transport's delivery thread. Errors are logged and never
/// interrupt ingestion.
pub trait FrameSubscriber: Send + Sync {
    fn on_frame(&self, frame: Frame) -> ZenResult<()>;
}

struct Codec {
    framing: Framing,
    parser: Box<dyn FrameParser>,
}

impl Codec {
    fn new(framing: Framing) -> Self {
        Self {
            framing,
            parser: framing.parser(),
        }
    }
}

pub struct Communicator {
    transport: Arc<dyn Transport>,
    codec: Mutex<Codec>,
    subscriber: RwLock<Option<Weak<dyn FrameSubscriber>>>,
    metrics: Arc<IngestionMetrics>,
}

impl Communicator {
    /// Wrap `transport` and start consuming its bytes.
    pub fn new(transport: Arc<dyn Transport>, framing: Framing) -> Arc<Self> {
        let communicator = Arc::new(Self {
            transport: transport.clone(),
            codec: Mutex::new(Codec::new(framing)),
            subscriber: RwLock::new(None),
            metrics: Arc::new(IngestionMetrics::new()),
        });

        let weak = Arc::downgrade(&communicator);
        transport.subscribe(Arc::new(move |bytes: &[u8]| {
            if let Some(communicator) = weak.upgrade() {
                communicator.process_bytes(bytes);
            }
        }));
        communicator
    }

    /// Route decoded frames to `subscriber`, replacing the previous one.
    pub fn attach(&self, subscriber: Weak<dyn FrameSubscriber>) {
        *self.subscriber.write().unwrap_or_else(PoisonError::into_inner) = Some(subscriber);
    }

    pub fn detach(&self) {
        *self.subscriber.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Swap in a new framing. Bytes of a partially parsed frame are dropped.
    pub fn set_framing(&self, framing: Framing) {
        let mut codec = self.codec.lock().unwrap_or_else(PoisonError::into_inner);
        if codec.framing != framing {
            debug!(from = ?codec.framing, to = ?framing, "codec swapped");
            *codec = Codec::new(framing);
        }
    }

    pub fn framing(&self) -> Framing {
        self.codec.lock().unwrap_or_else(PoisonError::into_inner).framing
    }

    /// Drop any partially parsed frame.
    pub fn reset_parser(&self) {
        self.codec
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .parser
            .reset();
    }

    /// Encode and send one frame.
    pub fn send(&self, address: u8, function: u8, payload: &[u8]) -> ZenResult<()> {
        let framing = self.framing();
        let wire = framing.encode(address, function, payload)?;
        trace!(address, function, len = payload.len(), "send frame");
        self.transport.send(&wire)?;
        self.metrics.record_sent();
        Ok(())
    }

    /// Parse inbound bytes and deliver every completed frame.
    pub fn process_bytes(&self, data: &[u8]) {
        self.metrics.record_bytes(data.len());
        let framing = self.framing();

        let mut frames = Vec::new();
        {
            let mut codec = self.codec.lock().unwrap_or_else(PoisonError::into_inner);
            codec::drive(
                codec.parser.as_mut(),
                data,
                |frame| frames.push(frame),
                |error| {
                    trace!(%error, "resynchronizing");
                    self.metrics.record_resync();
                    observability::record_resync(framing.label(), 1);
                },
            );
        }

        if frames.is_empty() {
            return;
        }

        let subscriber = self
            .subscriber
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);

        for frame in frames {
            self.metrics.record_frame();
            observability::record_frame_parsed(framing.label());
            let Some(subscriber) = subscriber.as_ref() else {
                self.metrics.record_orphaned();
                continue;
            };
            let (address, function) = (frame.address, frame.function);
            if let Err(error) = subscriber.on_frame(frame) {
                debug!(address, function, %error, "frame not processed");
            }
        }
    }

    pub fn baud_rate(&self) -> ZenResult<u32> {
        self.transport.baud_rate()
    }

    pub fn set_baud_rate(&self, rate: u32) -> ZenResult<()> {
        self.transport.set_baud_rate(rate)
    }

    pub fn supported_baud_rates(&self) -> ZenResult<Vec<u32>> {
        self.transport.supported_baud_rates()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    /// Stop receiving; subsequent bytes are ignored.
    pub fn close(&self) {
        self.transport.unsubscribe();
        self.detach();
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use contracts::ZenError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        frames: Mutex<Vec<Frame>>,
    }

    impl FrameSubscriber for Collector {
        fn on_frame(&self, frame: Frame) -> ZenResult<()> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_frames_reach_subscriber_in_order() {
        let transport = MockTransport::new();
        let communicator = Communicator::new(transport.clone(), Framing::Zensync);
        let collector = Arc::new(Collector::default());
        let weak: Weak<dyn FrameSubscriber> = Arc::downgrade(&collector) as Weak<dyn FrameSubscriber>;
        communicator.attach(weak);

        let mut wire = vec![0x00, 0x01];
        wire.extend(Framing::Zensync.encode(0, 9, &[1]).unwrap());
        wire.extend(Framing::Zensync.encode(0, 10, &[2]).unwrap());
        let (head, tail) = wire.split_at(7);
        communicator.process_bytes(head);
        communicator.process_bytes(tail);

        let frames = collector.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function, 9);
        assert_eq!(frames[1].function, 10);
        assert_eq!(communicator.metrics().snapshot().resync_bytes, 2);
    }

    #[test]
    fn test_send_uses_current_framing() {
        let transport = MockTransport::new();
        let communicator = Communicator::new(transport.clone(), Framing::Zensync);
        communicator.send(1, 6, &[]).unwrap();
        communicator.set_framing(Framing::Rtu);
        communicator.send(1, 6, &[]).unwrap();

        let sent = transport.sent_bytes();
        assert_eq!(sent[0], Framing::Zensync.encode(1, 6, &[]).unwrap());
        assert_eq!(sent[1], Framing::Rtu.encode(1, 6, &[]).unwrap());
        assert_eq!(
            communicator.send(1, 6, &[0; 256]),
            Err(ZenError::IoMsgTooBig)
        );
    }

    #[test]
    fn test_frames_without_subscriber_are_counted() {
        let transport = MockTransport::new();
        let communicator = Communicator::new(transport.clone(), Framing::Zensync);
        transport.inject(&Framing::Zensync.encode(0, 9, &[]).unwrap());
        assert_eq!(communicator.metrics().snapshot().frames_orphaned, 1);
    }
}
