//! GNSS properties of Ig1P devices

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{GnssProperty, PropertyRule, PropertyTag, PropertyType, PropertyValue, ZenError, ZenResult};
use ingestion::opcodes::OpcodeV1;
use tracing::debug;

use super::{rules, ChangeNotifier, DeviceChannel, Properties};

/// Largest correction chunk the firmware accepts per frame.
pub const RTK_CHUNK_LEN: usize = 255;

/// NAV-PVT flags occupy the low word, NAV-ATT and ESF-STATUS the high word.
const PVT_FLAGS: u32 = 29;

/// Bit of an output flag in the 64-bit GPS bitset.
pub fn gnss_bit(property: GnssProperty) -> Option<u32> {
    let index = property.tag().checked_sub(GnssProperty::OutputNavPvtITow.tag())?;
    if index < PVT_FLAGS {
        Some(index)
    } else {
        Some(index - PVT_FLAGS + 32)
    }
}

pub struct Ig1GnssProperties {
    channel: DeviceChannel,
    notifier: ChangeNotifier,
    rtk: bool,
    output_bitset: AtomicU64,
}

impl Ig1GnssProperties {
    pub fn new(channel: DeviceChannel, rtk: bool) -> Self {
        Self {
            channel,
            notifier: ChangeNotifier::new(),
            rtk,
            output_bitset: AtomicU64::new(0),
        }
    }

    pub fn output_bitset(&self) -> u64 {
        self.output_bitset.load(Ordering::Acquire)
    }

    pub fn load(&self) -> ZenResult<()> {
        let halves = self
            .channel
            .read_array::<u32>(OpcodeV1::GetGpsTransmitData.code(), 2)?;
        let [low, high] = halves[..] else {
            return Err(ZenError::IoMsgCorrupt);
        };
        let bitset = u64::from(low) | (u64::from(high) << 32);
        self.output_bitset.store(bitset, Ordering::Release);
        debug!(bitset = format_args!("{bitset:#018x}"), "gnss state loaded");
        Ok(())
    }

    /// Persist the receiver state so the next start is warm.
    pub fn save_state(&self) -> ZenResult<()> {
        self.channel.command(OpcodeV1::SaveGpsState.code())
    }

    /// Forward RTCM correction data to the receiver.
    pub fn forward_rtk_correction(&self, data: &[u8]) -> ZenResult<()> {
        if !self.rtk {
            return Err(ZenError::NotSupported);
        }
        for chunk in data.chunks(RTK_CHUNK_LEN) {
            self.channel
                .send_unacked(OpcodeV1::SetRtkCorrection.code(), chunk)?;
        }
        Ok(())
    }

    fn set_output_bit(&self, bit: u32, enable: bool) -> ZenResult<()> {
        let section = self.channel.quiesce()?;
        let current = self.output_bitset();
        let mask = if enable { current | (1 << bit) } else { current & !(1 << bit) };
        let mut payload = (mask as u32).to_le_bytes().to_vec();
        payload.extend_from_slice(&((mask >> 32) as u32).to_le_bytes());
        self.channel
            .write_in(&section, OpcodeV1::SetGpsTransmitData.code(), &payload)?;
        self.output_bitset.store(mask, Ordering::Release);
        drop(section);
        Ok(())
    }
}

impl Properties for Ig1GnssProperties {
    fn rule(&self, tag: PropertyTag) -> PropertyRule {
        rules::gnss(tag)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    fn get_bool(&self, tag: PropertyTag) -> ZenResult<bool> {
        self.check_read(tag, PropertyType::Bool, false)?;
        let property = GnssProperty::try_from(tag)?;
        match gnss_bit(property) {
            Some(bit) => Ok(self.output_bitset() & (1 << bit) != 0),
            None => Ok(self.channel.stream().is_streaming()),
        }
    }

    fn set_bool(&self, tag: PropertyTag, value: bool) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Bool, false)?;
        let property = GnssProperty::try_from(tag)?;
        match gnss_bit(property) {
            Some(bit) => self.set_output_bit(bit, value)?,
            None => {
                self.channel.stream().set_streaming(value)?;
            }
        }
        self.notifier.notify(tag, &PropertyValue::Bool(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ig1_rig;

    #[test]
    fn test_bit_layout() {
        assert_eq!(gnss_bit(GnssProperty::StreamData), None);
        assert_eq!(gnss_bit(GnssProperty::OutputNavPvtITow), Some(0));
        assert_eq!(gnss_bit(GnssProperty::OutputNavPvtHeadVeh), Some(28));
        assert_eq!(gnss_bit(GnssProperty::OutputNavAttITow), Some(32));
        assert_eq!(gnss_bit(GnssProperty::OutputEsfStatusSensStatus), Some(46));
    }

    #[test]
    fn test_high_word_toggle() {
        let rig = ig1_rig("LPMS-IG1P-RS232");
        let properties = Ig1GnssProperties::new(DeviceChannel::new(rig.stream.clone()), false);
        properties.load().unwrap();
        assert_eq!(properties.output_bitset(), 0);

        let tag = GnssProperty::OutputNavAttRoll.tag();
        properties.set_bool(tag, true).unwrap();
        assert_eq!(properties.get_bool(tag), Ok(true));
        assert_eq!(rig.device.gps_bitset(), 1 << 34);

        properties.set_bool(GnssProperty::OutputNavPvtLatitude.tag(), true).unwrap();
        assert_eq!(rig.device.gps_bitset(), (1 << 34) | (1 << 15));
    }

    #[test]
    fn test_rtk_forwarding_is_chunked() {
        let rig = ig1_rig("LPMS-IG1P-RS232");
        let plain = Ig1GnssProperties::new(DeviceChannel::new(rig.stream.clone()), false);
        assert_eq!(plain.forward_rtk_correction(&[1, 2, 3]), Err(ZenError::NotSupported));

        let rtk = Ig1GnssProperties::new(DeviceChannel::new(rig.stream.clone()), true);
        rtk.forward_rtk_correction(&[7u8; 600]).unwrap();
        let lengths: Vec<_> = rig
            .transport
            .sent_frames()
            .iter()
            .filter(|frame| frame.function == 166)
            .map(|frame| frame.payload.len())
            .collect();
        assert_eq!(lengths, vec![255, 255, 90]);
    }

    #[test]
    fn test_save_state() {
        let rig = ig1_rig("LPMS-IG1P-RS232");
        let properties = Ig1GnssProperties::new(DeviceChannel::new(rig.stream.clone()), false);
        properties.save_state().unwrap();
        assert_eq!(rig.device.received_functions(), vec![162]);
    }
}
