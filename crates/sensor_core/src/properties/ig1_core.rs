//! Sensor-wide properties of Ig1 devices

use contracts::{
    PropertyRule, PropertyTag, PropertyType, PropertyValue, SensorProperty, ZenError, ZenResult,
    MAX_PAYLOAD_LEN,
};
use ingestion::opcodes::OpcodeV1;

use super::legacy_core::supported_baud_rates;
use super::{rules, ChangeNotifier, DeviceChannel, Properties};

/// First three numeric groups of a firmware info string such as
/// `"v-10-100-100-100-100-100"`.
pub(crate) fn parse_firmware_version(info: &[u8]) -> ZenResult<[i32; 3]> {
    let text = String::from_utf8_lossy(info);
    let mut parts = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<i32>().map_err(|_| ZenError::IoMsgCorrupt));
    let mut version = [0; 3];
    for slot in &mut version {
        *slot = parts.next().ok_or(ZenError::IoMsgCorrupt)??;
    }
    Ok(version)
}

pub struct Ig1CoreProperties {
    channel: DeviceChannel,
    notifier: ChangeNotifier,
}

impl Ig1CoreProperties {
    pub fn new(channel: DeviceChannel) -> Self {
        Self {
            channel,
            notifier: ChangeNotifier::new(),
        }
    }

    fn read_string(&self, function: OpcodeV1) -> ZenResult<Vec<u8>> {
        self.channel.read_array::<u8>(function.code(), MAX_PAYLOAD_LEN)
    }
}

impl Properties for Ig1CoreProperties {
    fn rule(&self, tag: PropertyTag) -> PropertyRule {
        rules::ig1_core(tag)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    fn execute(&self, tag: PropertyTag) -> ZenResult<()> {
        self.check_command(tag)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::StoreSettingsInFlash => self.channel.command(OpcodeV1::WriteRegisters.code()),
            SensorProperty::RestoreFactorySettings => {
                self.channel.command(OpcodeV1::RestoreFactorySettings.code())
            }
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_array(&self, tag: PropertyTag, ty: PropertyType) -> ZenResult<PropertyValue> {
        self.check_read(tag, ty, true)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::DeviceName | SensorProperty::SensorModel => {
                self.read_string(OpcodeV1::GetSensorModel).map(PropertyValue::Bytes)
            }
            SensorProperty::FirmwareInfo => self.read_string(OpcodeV1::GetFirmwareInfo).map(PropertyValue::Bytes),
            SensorProperty::SerialNumber => self.read_string(OpcodeV1::GetSerialNumber).map(PropertyValue::Bytes),
            SensorProperty::FirmwareVersion => {
                let info = self.read_string(OpcodeV1::GetFirmwareInfo)?;
                Ok(PropertyValue::Int32Array(parse_firmware_version(&info)?.to_vec()))
            }
            SensorProperty::SupportedBaudRates => supported_baud_rates(&self.channel),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_int32(&self, tag: PropertyTag) -> ZenResult<i32> {
        self.check_read(tag, PropertyType::Int32, false)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::BaudRate => self.channel.communicator().baud_rate().map(|rate| rate as i32),
            // the firmware only accepts a new timestamp
            SensorProperty::TimeOffset => Err(ZenError::NotSupported),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_int32(&self, tag: PropertyTag, value: i32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Int32, false)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::BaudRate => {
                let rate = u32::try_from(value).map_err(|_| ZenError::InvalidArgument)?;
                self.channel.communicator().set_baud_rate(rate)?;
            }
            SensorProperty::TimeOffset => {
                self.channel.write_u32(OpcodeV1::SetTimestamp.code(), value as u32)?;
            }
            _ => return Err(ZenError::UnknownProperty),
        }
        self.notifier.notify(tag, &PropertyValue::Int32(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ig1_rig;

    #[test]
    fn test_parse_firmware_version() {
        assert_eq!(parse_firmware_version(b"v-10-100-100-100-100-100"), Ok([10, 100, 100]));
        assert_eq!(parse_firmware_version(b"2.0.5"), Ok([2, 0, 5]));
        assert_eq!(parse_firmware_version(b"v-1"), Err(ZenError::IoMsgCorrupt));
    }

    #[test]
    fn test_model_and_version() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = Ig1CoreProperties::new(DeviceChannel::new(rig.stream.clone()));

        let model = properties
            .get_array(SensorProperty::SensorModel.tag(), PropertyType::Byte)
            .unwrap();
        assert_eq!(model.as_bytes(), Some(&b"LPMS-IG1-RS232"[..]));
        assert_eq!(
            properties.get_array(SensorProperty::FirmwareVersion.tag(), PropertyType::Int32),
            Ok(PropertyValue::Int32Array(vec![10, 100, 100]))
        );
    }

    #[test]
    fn test_time_offset_is_write_only() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = Ig1CoreProperties::new(DeviceChannel::new(rig.stream.clone()));
        let tag = SensorProperty::TimeOffset.tag();

        assert_eq!(properties.get_int32(tag), Err(ZenError::NotSupported));
        properties.set_int32(tag, 1234).unwrap();
        let sent = rig.device.received();
        assert_eq!(sent[0].function, 152);
        assert_eq!(&sent[0].payload[..], &1234u32.to_le_bytes());
    }

    #[test]
    fn test_battery_is_unknown() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = Ig1CoreProperties::new(DeviceChannel::new(rig.stream.clone()));
        assert_eq!(
            properties.get_float(SensorProperty::BatteryLevel.tag()),
            Err(ZenError::UnknownProperty)
        );
    }
}
