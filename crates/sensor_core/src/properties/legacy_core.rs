//! Sensor-wide properties of legacy devices

use std::sync::atomic::{AtomicI32, Ordering};

use contracts::{
    PropertyRule, PropertyTag, PropertyType, PropertyValue, SensorProperty, ZenError, ZenResult,
    MAX_PAYLOAD_LEN,
};
use ingestion::opcodes::OpcodeV0;
use tracing::debug;

use super::{rules, ChangeNotifier, DeviceChannel, Properties};

/// Read the baud rate table straight from the transport.
pub(crate) fn supported_baud_rates(channel: &DeviceChannel) -> ZenResult<PropertyValue> {
    let rates = channel.communicator().supported_baud_rates()?;
    Ok(PropertyValue::Int32Array(rates.into_iter().map(|rate| rate as i32).collect()))
}

pub struct LegacyCoreProperties {
    channel: DeviceChannel,
    notifier: ChangeNotifier,
    /// Last accepted data mode; the firmware has no getter
    data_mode: AtomicI32,
}

impl LegacyCoreProperties {
    pub fn new(channel: DeviceChannel) -> Self {
        Self {
            channel,
            notifier: ChangeNotifier::new(),
            data_mode: AtomicI32::new(0),
        }
    }

    fn notify(&self, property: SensorProperty, value: PropertyValue) {
        self.notifier.notify(property.tag(), &value);
    }
}

impl Properties for LegacyCoreProperties {
    fn rule(&self, tag: PropertyTag) -> PropertyRule {
        rules::legacy_core(tag)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    fn execute(&self, tag: PropertyTag) -> ZenResult<()> {
        self.check_command(tag)?;
        let function = match SensorProperty::try_from(tag)? {
            SensorProperty::StoreSettingsInFlash => OpcodeV0::WriteRegisters,
            SensorProperty::RestoreFactorySettings => OpcodeV0::RestoreFactorySettings,
            _ => return Err(ZenError::UnknownProperty),
        };
        debug!(tag, function = function.code(), "execute");
        self.channel.command(function.code())
    }

    fn get_array(&self, tag: PropertyTag, ty: PropertyType) -> ZenResult<PropertyValue> {
        self.check_read(tag, ty, true)?;
        let bytes = |function: OpcodeV0| {
            self.channel
                .read_array::<u8>(function.code(), MAX_PAYLOAD_LEN)
                .map(PropertyValue::Bytes)
        };
        match SensorProperty::try_from(tag)? {
            SensorProperty::DeviceName => bytes(OpcodeV0::GetDeviceName),
            SensorProperty::FirmwareInfo => bytes(OpcodeV0::GetFirmwareInfo),
            SensorProperty::SerialNumber => bytes(OpcodeV0::GetSerialNumber),
            SensorProperty::FirmwareVersion => {
                let version = self
                    .channel
                    .read_array::<u32>(OpcodeV0::GetFirmwareVersion.code(), 3)?;
                Ok(PropertyValue::Int32Array(version.into_iter().map(|part| part as i32).collect()))
            }
            SensorProperty::SupportedBaudRates => supported_baud_rates(&self.channel),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_bool(&self, tag: PropertyTag) -> ZenResult<bool> {
        self.check_read(tag, PropertyType::Bool, false)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::BatteryCharging => self
                .channel
                .read::<u32>(OpcodeV0::GetBatteryCharging.code())
                .map(|charging| charging != 0),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_float(&self, tag: PropertyTag) -> ZenResult<f32> {
        self.check_read(tag, PropertyType::Float, false)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::BatteryLevel => self.channel.read(OpcodeV0::GetBatteryLevel.code()),
            SensorProperty::BatteryVoltage => self.channel.read(OpcodeV0::GetBatteryVoltage.code()),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_int32(&self, tag: PropertyTag) -> ZenResult<i32> {
        self.check_read(tag, PropertyType::Int32, false)?;
        match SensorProperty::try_from(tag)? {
            SensorProperty::BaudRate => self.channel.communicator().baud_rate().map(|rate| rate as i32),
            SensorProperty::DataMode => Ok(self.data_mode.load(Ordering::Acquire)),
            SensorProperty::TimeOffset => self
                .channel
                .read::<u32>(OpcodeV0::GetPing.code())
                .map(|ticks| ticks as i32),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_int32(&self, tag: PropertyTag, value: i32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Int32, false)?;
        let property = SensorProperty::try_from(tag)?;
        match property {
            SensorProperty::BaudRate => {
                let rate = u32::try_from(value).map_err(|_| ZenError::InvalidArgument)?;
                self.channel.communicator().set_baud_rate(rate)?;
            }
            SensorProperty::DataMode => {
                self.channel.write_u32(OpcodeV0::SetDataMode.code(), value as u32)?;
                self.data_mode.store(value, Ordering::Release);
            }
            SensorProperty::TimeOffset => {
                self.channel.write_u32(OpcodeV0::SetTimestamp.code(), value as u32)?;
            }
            _ => return Err(ZenError::UnknownProperty),
        }
        self.notify(property, PropertyValue::Int32(value));
        Ok(())
    }
}
