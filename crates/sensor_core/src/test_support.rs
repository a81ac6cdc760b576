//! Simulated device wiring for unit tests.

use std::sync::{Arc, Weak};
use std::time::Duration;

use contracts::{Frame, Framing, ZenError, ZenResult};
use ingestion::mock::{MockTransport, SimulatedDevice};
use ingestion::{Communicator, FrameSubscriber, SyncedCommunicator};

use crate::properties::StreamControl;

/// Publishes acks, nacks and raw reply bytes under their function code.
pub struct RawRouter(Arc<SyncedCommunicator>);

impl FrameSubscriber for RawRouter {
    fn on_frame(&self, frame: Frame) -> ZenResult<()> {
        match frame.function {
            0 => self.0.publish_ack(0, Ok(())),
            1 => self.0.publish_ack(0, Err(ZenError::FwFunctionFailed)),
            function => self.0.publish_array(u32::from(function), Ok(&frame.payload[..])),
        }
        Ok(())
    }
}

pub struct Rig {
    pub device: Arc<SimulatedDevice>,
    pub transport: Arc<MockTransport>,
    pub stream: Arc<StreamControl>,
    _router: Arc<RawRouter>,
}

fn rig(device: Arc<SimulatedDevice>) -> Rig {
    let transport = MockTransport::with_device("rig", device.clone());
    let communicator = Communicator::new(transport.clone(), Framing::Zensync);
    let synced = Arc::new(SyncedCommunicator::with_timeout(
        communicator.clone(),
        Duration::from_millis(1000),
    ));
    let router = Arc::new(RawRouter(synced.clone()));
    communicator.attach(Arc::downgrade(&router) as Weak<dyn FrameSubscriber>);
    Rig {
        device,
        transport,
        stream: StreamControl::new(synced),
        _router: router,
    }
}

pub fn ig1_rig(model: &str) -> Rig {
    rig(SimulatedDevice::ig1(model))
}

pub fn legacy_rig() -> Rig {
    rig(SimulatedDevice::legacy())
}

/// Encode `values` the way the firmware does.
pub fn le_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}
