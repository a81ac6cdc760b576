//! Sensor component abstraction
//!
//! A component is one logical measurement channel of a physical sensor (an
//! IMU or a GNSS receiver). It owns the properties of that channel, answers
//! the replies addressed to them and turns raw sample frames into typed
//! event payloads.

use std::sync::Arc;

use contracts::{EventPayload, SensorInitError, ZenError, ZenResult};

use crate::properties::Properties;

pub trait SensorComponent: Send + Sync {
    /// Component id, `"imu"` or `"gnss"`
    fn kind(&self) -> &'static str;

    fn properties(&self) -> Arc<dyn Properties>;

    /// Load caches and leave the device streaming.
    fn init(&self) -> Result<(), SensorInitError>;

    /// Flush state back to the device before the link goes away.
    fn close(&self) -> ZenResult<()> {
        Ok(())
    }

    /// Publish a reply addressed to this component's properties.
    ///
    /// `IoUnsupportedFunction` means the frame belongs to someone else.
    fn process_data(&self, function: u8, payload: &[u8]) -> ZenResult<()>;

    /// Function code of this component's sample frames.
    fn sample_function(&self) -> u8;

    fn parse_sample(&self, payload: &[u8]) -> ZenResult<EventPayload>;

    fn forward_rtk_correction(&self, _data: &[u8]) -> ZenResult<()> {
        Err(ZenError::NotSupported)
    }
}

impl std::fmt::Debug for dyn SensorComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorComponent")
            .field("kind", &self.kind())
            .field("sample_function", &self.sample_function())
            .finish()
    }
}
