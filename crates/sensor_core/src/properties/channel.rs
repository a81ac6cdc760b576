//! Device channel
//!
//! Request helpers shared by the properties implementations. Each call runs
//! under a [`StreamGuard`](super::StreamGuard) and uses the function code as
//! the awaited property key, which is what the sensor's frame dispatch
//! publishes replies under.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use contracts::ZenResult;
use ingestion::{Communicator, SyncedCommunicator};

use super::{StreamControl, StreamGuard};

#[derive(Debug, Clone)]
pub struct DeviceChannel {
    stream: Arc<StreamControl>,
}

impl DeviceChannel {
    pub fn new(stream: Arc<StreamControl>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &Arc<StreamControl> {
        &self.stream
    }

    fn synced(&self) -> &SyncedCommunicator {
        self.stream.synced()
    }

    /// Baud rate control is delegated straight to the transport.
    pub fn communicator(&self) -> &Arc<Communicator> {
        self.synced().communicator()
    }

    /// Command without payload, acknowledged by the device.
    pub fn command(&self, function: u8) -> ZenResult<()> {
        self.write(function, &[])
    }

    pub fn read<T: Pod>(&self, function: u8) -> ZenResult<T> {
        let _guard = self.stream.quiesce()?;
        self.synced()
            .send_and_wait_for_result(0, function, u32::from(function), &[])
    }

    /// Read at most `capacity` elements.
    pub fn read_array<T: Pod>(&self, function: u8, capacity: usize) -> ZenResult<Vec<T>> {
        let mut out = vec![T::zeroed(); capacity];
        let count = {
            let _guard = self.stream.quiesce()?;
            self.synced()
                .send_and_wait_for_array(0, function, u32::from(function), &[], &mut out)?
        };
        out.truncate(count);
        Ok(out)
    }

    pub fn write(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        let section = self.stream.quiesce()?;
        self.write_in(&section, function, payload)
    }

    /// Open a quiesced section spanning several steps.
    pub fn quiesce(&self) -> ZenResult<StreamGuard<'_>> {
        self.stream.quiesce()
    }

    /// Write inside a section the caller holds. Cached state that shapes the
    /// stream must be updated before `section` drops.
    pub fn write_in(&self, _section: &StreamGuard<'_>, function: u8, payload: &[u8]) -> ZenResult<()> {
        self.synced()
            .send_and_wait_for_ack(0, function, u32::from(function), payload)
    }

    pub fn write_u32(&self, function: u8, value: u32) -> ZenResult<()> {
        self.write(function, &value.to_le_bytes())
    }

    pub fn write_floats(&self, function: u8, values: &[f32]) -> ZenResult<()> {
        self.write(function, bytemuck::cast_slice(values))
    }

    /// Fire and forget, outside any quiesced section.
    pub fn send_unacked(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        self.synced().send_and_dont_wait(0, function, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ig1_rig;

    #[test]
    fn test_read_and_write_under_quiescence() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        rig.stream.set_streaming(true).unwrap();
        rig.device.clear_received();

        let channel = DeviceChannel::new(rig.stream.clone());
        assert_eq!(channel.read::<u32>(91), Ok(3));
        channel.write_u32(90, 1).unwrap();
        assert_eq!(channel.read::<u32>(91), Ok(1));

        assert_eq!(
            rig.device.received_functions(),
            vec![6, 91, 7, 6, 90, 7, 6, 91, 7]
        );
    }

    #[test]
    fn test_read_array() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let channel = DeviceChannel::new(rig.stream.clone());
        let serial = channel.read_array::<u8>(22, 64).unwrap();
        assert_eq!(serial, b"IG1-000123");
    }
}
