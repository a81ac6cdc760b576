//! IMU properties of Ig1 devices

use std::sync::atomic::{AtomicU32, Ordering};

use contracts::{ImuProperty, PropertyRule, PropertyTag, PropertyType, PropertyValue, ZenError, ZenResult};
use ingestion::opcodes::OpcodeV1;
use tracing::debug;

use super::value_map::{
    ValueMap, ACC_RANGES, GYR_RANGES, IG1_CAN_BAUD_RATES, IG1_CAN_HEARTBEATS, IG1_UART_BAUD_RATES,
    MAG_RANGES, SAMPLING_RATES,
};
use super::{rules, ChangeNotifier, DeviceChannel, Properties};
use crate::parsing::read_value;

/// Bit of an output flag in the Ig1 IMU bitset. The wire order of sample
/// fields follows the bit order.
pub fn ig1_imu_bit(property: ImuProperty) -> Option<u32> {
    use ImuProperty as P;

    let bit = match property {
        P::OutputRawAcc => 0,
        P::OutputAccCalibrated => 1,
        // single-gyro clients address gyro 0 through the generic flag
        P::OutputRawGyr0 | P::OutputRawGyr => 2,
        P::OutputRawGyr1 => 3,
        P::OutputGyr0BiasCalib => 4,
        P::OutputGyr1BiasCalib => 5,
        P::OutputGyr0AlignCalib => 6,
        P::OutputGyr1AlignCalib => 7,
        P::OutputRawMag => 8,
        P::OutputMagCalib => 9,
        P::OutputAngularVel => 10,
        P::OutputQuat => 11,
        P::OutputEuler => 12,
        P::OutputLinearAcc => 13,
        P::OutputPressure => 14,
        P::OutputAltitude => 15,
        P::OutputTemperature => 16,
        _ => return None,
    };
    Some(bit)
}

/// (getter, setter, map); `None` getter means write-only.
fn int_property(property: ImuProperty) -> Option<(Option<OpcodeV1>, OpcodeV1, Option<ValueMap>)> {
    use ImuProperty as P;
    use OpcodeV1 as Op;

    let entry = match property {
        P::FilterMode => (Some(Op::GetFilterMode), Op::SetFilterMode, None),
        P::AccRange => (Some(Op::GetAccRange), Op::SetAccRange, Some(ACC_RANGES)),
        P::GyrRange => (Some(Op::GetGyrRange), Op::SetGyrRange, Some(GYR_RANGES)),
        P::MagRange => (Some(Op::GetMagRange), Op::SetMagRange, Some(MAG_RANGES)),
        P::OrientationOffsetMode => (None, Op::SetOrientationOffsetMode, None),
        P::CanStartId => (Some(Op::GetCanStartId), Op::SetCanStartId, None),
        P::CanBaudRate => (Some(Op::GetCanBaudRate), Op::SetCanBaudRate, Some(IG1_CAN_BAUD_RATES)),
        P::CanDataPrecision => (Some(Op::GetCanDataPrecision), Op::SetCanDataPrecision, None),
        P::CanHeartbeat => (Some(Op::GetCanHeartbeat), Op::SetCanHeartbeat, Some(IG1_CAN_HEARTBEATS)),
        P::UartBaudRate => (Some(Op::GetUartBaudRate), Op::SetUartBaudRate, Some(IG1_UART_BAUD_RATES)),
        P::UartFormat => (Some(Op::GetUartFormat), Op::SetUartFormat, None),
        _ => return None,
    };
    Some(entry)
}

fn bool_property(property: ImuProperty) -> Option<(OpcodeV1, OpcodeV1)> {
    use ImuProperty as P;
    use OpcodeV1 as Op;

    match property {
        P::GyrUseAutoCalibration => Some((Op::GetEnableGyrAutoCalibration, Op::SetEnableGyrAutoCalibration)),
        P::GyrUseThreshold => Some((Op::GetGyrThreshold, Op::SetGyrThreshold)),
        P::DegRadOutput => Some((Op::GetDegGradOutput, Op::SetDegGradOutput)),
        _ => None,
    }
}

/// 设备固件未提供读写功能码的属性: 元数据可查询, 访问返回 NotSupported
fn without_opcode(property: ImuProperty) -> bool {
    use ImuProperty as P;

    matches!(
        property,
        P::CentricCompensationRate
            | P::LinearCompensationRate
            | P::FieldRadius
            | P::FilterPreset
            | P::AccAlignment
            | P::AccBias
            | P::GyrAlignment
            | P::GyrBias
            | P::MagAlignment
            | P::MagBias
            | P::MagReference
            | P::MagHardIronOffset
            | P::MagSoftIronMatrix
    )
}

pub struct Ig1ImuProperties {
    channel: DeviceChannel,
    notifier: ChangeNotifier,
    second_gyro: bool,
    output_bitset: AtomicU32,
    sampling_rate: AtomicU32,
}

impl Ig1ImuProperties {
    pub fn new(channel: DeviceChannel, second_gyro: bool) -> Self {
        Self {
            channel,
            notifier: ChangeNotifier::new(),
            second_gyro,
            output_bitset: AtomicU32::new(0),
            sampling_rate: AtomicU32::new(0),
        }
    }

    pub fn output_bitset(&self) -> u32 {
        self.output_bitset.load(Ordering::Acquire)
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate.load(Ordering::Acquire)
    }

    pub fn channel(&self) -> &DeviceChannel {
        &self.channel
    }

    /// Read the output bitset and the stream frequency into the caches.
    pub fn load(&self) -> ZenResult<()> {
        let bitset = self.channel.read::<u32>(OpcodeV1::GetImuTransmitData.code())?;
        self.output_bitset.store(bitset, Ordering::Release);
        let rate = self.channel.read::<u32>(OpcodeV1::GetStreamFreq.code())?;
        self.sampling_rate.store(rate, Ordering::Release);
        debug!(bitset = format_args!("{bitset:#010x}"), rate, "ig1 imu state loaded");
        Ok(())
    }

    /// Publish a component-level reply to the waiting caller.
    pub fn process_reply(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        use OpcodeV1 as Op;

        match Op::from_code(function) {
            Some(
                Op::GetStreamFreq
                | Op::GetDegGradOutput
                | Op::GetAccRange
                | Op::GetGyrRange
                | Op::GetEnableGyrAutoCalibration
                | Op::GetGyrThreshold
                | Op::GetMagRange
                | Op::GetFilterMode
                | Op::GetCanStartId
                | Op::GetCanBaudRate
                | Op::GetCanDataPrecision
                | Op::GetCanHeartbeat
                | Op::GetUartBaudRate
                | Op::GetUartFormat,
            ) => {
                self.channel
                    .stream()
                    .synced()
                    .publish_result(u32::from(function), read_value::<u32>(payload));
                Ok(())
            }
            _ => Err(ZenError::IoUnsupportedFunction),
        }
    }

    /// The cache changes before streaming resumes, so the first sample in the
    /// new layout is already parsed with the new bitset.
    fn set_output_bit(&self, bit: u32, enable: bool) -> ZenResult<()> {
        let section = self.channel.quiesce()?;
        let current = self.output_bitset();
        let mask = if enable { current | (1 << bit) } else { current & !(1 << bit) };
        self.channel
            .write_in(&section, OpcodeV1::SetImuTransmitData.code(), &mask.to_le_bytes())?;
        self.output_bitset.store(mask, Ordering::Release);
        drop(section);
        debug!(mask = format_args!("{mask:#010x}"), "imu output bitset updated");
        Ok(())
    }
}

impl Properties for Ig1ImuProperties {
    fn rule(&self, tag: PropertyTag) -> PropertyRule {
        rules::ig1_imu(tag, self.second_gyro)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    fn execute(&self, tag: PropertyTag) -> ZenResult<()> {
        self.check_command(tag)?;
        match ImuProperty::try_from(tag)? {
            ImuProperty::PollSensorData => self
                .channel
                .send_unacked(OpcodeV1::GetRawImuSensorData.code(), &[]),
            ImuProperty::CalibrateGyro => self.channel.command(OpcodeV1::StartGyroCalibration.code()),
            ImuProperty::ResetOrientationOffset => {
                self.channel.command(OpcodeV1::ResetOrientationOffset.code())
            }
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_array(&self, tag: PropertyTag, ty: PropertyType) -> ZenResult<PropertyValue> {
        self.check_read(tag, ty, true)?;
        let supported = |map: ValueMap| Ok(PropertyValue::Int32Array(map.supported().to_vec()));
        match ImuProperty::try_from(tag)? {
            ImuProperty::SupportedSamplingRates => supported(SAMPLING_RATES),
            ImuProperty::AccSupportedRanges => supported(ACC_RANGES),
            ImuProperty::GyrSupportedRanges => supported(GYR_RANGES),
            ImuProperty::MagSupportedRanges => supported(MAG_RANGES),
            ImuProperty::SupportedFilterModes => Ok(PropertyValue::Bytes(rules::supported_filter_modes())),
            property if without_opcode(property) => Err(ZenError::NotSupported),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_array(&self, tag: PropertyTag, value: &PropertyValue) -> ZenResult<()> {
        self.check_write(tag, value.property_type(), true)?;
        match ImuProperty::try_from(tag)? {
            property if without_opcode(property) => Err(ZenError::NotSupported),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_float(&self, tag: PropertyTag) -> ZenResult<f32> {
        self.check_read(tag, PropertyType::Float, false)?;
        match ImuProperty::try_from(tag)? {
            property if without_opcode(property) => Err(ZenError::NotSupported),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_float(&self, tag: PropertyTag, _value: f32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Float, false)?;
        match ImuProperty::try_from(tag)? {
            property if without_opcode(property) => Err(ZenError::NotSupported),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_bool(&self, tag: PropertyTag) -> ZenResult<bool> {
        self.check_read(tag, PropertyType::Bool, false)?;
        let property = ImuProperty::try_from(tag)?;
        if let Some(bit) = ig1_imu_bit(property) {
            return Ok(self.output_bitset() & (1 << bit) != 0);
        }
        if property == ImuProperty::StreamData {
            return Ok(self.channel.stream().is_streaming());
        }
        let (getter, _) = bool_property(property).ok_or(ZenError::UnknownProperty)?;
        self.channel.read::<u32>(getter.code()).map(|value| value != 0)
    }

    fn set_bool(&self, tag: PropertyTag, value: bool) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Bool, false)?;
        let property = ImuProperty::try_from(tag)?;
        if let Some(bit) = ig1_imu_bit(property) {
            self.set_output_bit(bit, value)?;
        } else if property == ImuProperty::StreamData {
            self.channel.stream().set_streaming(value)?;
        } else {
            let (_, setter) = bool_property(property).ok_or(ZenError::UnknownProperty)?;
            self.channel.write_u32(setter.code(), u32::from(value))?;
        }
        self.notifier.notify(tag, &PropertyValue::Bool(value));
        Ok(())
    }

    fn get_int32(&self, tag: PropertyTag) -> ZenResult<i32> {
        self.check_read(tag, PropertyType::Int32, false)?;
        let property = ImuProperty::try_from(tag)?;
        if property == ImuProperty::SamplingRate {
            return Ok(self.sampling_rate() as i32);
        }
        if without_opcode(property) {
            return Err(ZenError::NotSupported);
        }
        let (getter, _, map) = int_property(property).ok_or(ZenError::UnknownProperty)?;
        let getter = getter.ok_or(ZenError::NotSupported)?;
        let wire = self.channel.read::<u32>(getter.code())?;
        match map {
            Some(map) => map.decode(wire),
            None => Ok(wire as i32),
        }
    }

    fn set_int32(&self, tag: PropertyTag, value: i32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Int32, false)?;
        let property = ImuProperty::try_from(tag)?;
        if without_opcode(property) {
            return Err(ZenError::NotSupported);
        }
        let applied = if property == ImuProperty::SamplingRate {
            let rate = SAMPLING_RATES.round_up(value);
            self.channel
                .write_u32(OpcodeV1::SetStreamFreq.code(), SAMPLING_RATES.encode(rate))?;
            self.sampling_rate.store(rate as u32, Ordering::Release);
            rate
        } else {
            let (_, setter, map) = int_property(property).ok_or(ZenError::UnknownProperty)?;
            match map {
                Some(map) => {
                    self.channel.write_u32(setter.code(), map.encode(value))?;
                    map.round_up(value)
                }
                None => {
                    self.channel.write_u32(setter.code(), value as u32)?;
                    value
                }
            }
        };
        self.notifier.notify(tag, &PropertyValue::Int32(applied));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ig1_rig, Rig};

    fn loaded(rig: &Rig) -> Ig1ImuProperties {
        let properties = Ig1ImuProperties::new(DeviceChannel::new(rig.stream.clone()), false);
        properties.load().unwrap();
        properties
    }

    #[test]
    fn test_linear_acc_toggle_masks() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        rig.device.clear_received();

        let tag = ImuProperty::OutputLinearAcc.tag();
        properties.set_bool(tag, true).unwrap();
        assert_eq!(properties.get_bool(tag), Ok(true));
        properties.set_bool(tag, false).unwrap();
        assert_eq!(properties.get_bool(tag), Ok(false));

        let masks: Vec<_> = rig
            .device
            .received()
            .iter()
            .filter(|frame| frame.function == 30)
            .map(|frame| u32::from_le_bytes(frame.payload[..4].try_into().unwrap()))
            .collect();
        assert_eq!(masks, vec![0x2001, 0x0001]);
    }

    #[test]
    fn test_raw_gyr_aliases_gyro_zero() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        properties.set_bool(ImuProperty::OutputRawGyr.tag(), true).unwrap();
        assert_eq!(properties.get_bool(ImuProperty::OutputRawGyr0.tag()), Ok(true));
        assert_eq!(
            properties.set_bool(ImuProperty::OutputRawGyr1.tag(), true),
            Err(ZenError::UnknownProperty)
        );
    }

    #[test]
    fn test_sampling_rate_from_cache() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        rig.device.clear_received();

        assert_eq!(properties.get_int32(ImuProperty::SamplingRate.tag()), Ok(100));
        assert!(rig.device.received_functions().is_empty());

        properties.set_int32(ImuProperty::SamplingRate.tag(), 300).unwrap();
        assert_eq!(properties.get_int32(ImuProperty::SamplingRate.tag()), Ok(400));
        assert_eq!(rig.device.received_functions(), vec![34]);
    }

    #[test]
    fn test_uart_baud_rate_codes() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        let tag = ImuProperty::UartBaudRate.tag();
        assert_eq!(properties.get_int32(tag), Ok(921_600));
        properties.set_int32(tag, 115_200).unwrap();
        assert_eq!(properties.get_int32(tag), Ok(115_200));
        assert_eq!(rig.device.state().registers[&131], 4u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_bool_register_round_trip() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        let tag = ImuProperty::GyrUseAutoCalibration.tag();
        assert_eq!(properties.get_bool(tag), Ok(true));
        properties.set_bool(tag, false).unwrap();
        assert_eq!(properties.get_bool(tag), Ok(false));
    }

    #[test]
    fn test_filter_mode_quiesces_stream() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        properties.set_bool(ImuProperty::StreamData.tag(), true).unwrap();
        rig.device.clear_received();

        assert_eq!(properties.get_int32(ImuProperty::FilterMode.tag()), Ok(3));
        assert_eq!(rig.device.received_functions(), vec![6, 91, 7]);
        assert_eq!(properties.get_bool(ImuProperty::StreamData.tag()), Ok(true));
    }

    #[test]
    fn test_calibration_properties_have_metadata_only() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        rig.device.clear_received();

        let bias = ImuProperty::AccBias.tag();
        assert!(properties.is_array(bias));
        assert_eq!(properties.property_type(bias), PropertyType::Float);
        assert_eq!(properties.get_array(bias, PropertyType::Float), Err(ZenError::NotSupported));
        assert_eq!(
            properties.set_array(ImuProperty::MagSoftIronMatrix.tag(), &PropertyValue::FloatArray(vec![0.0; 9])),
            Err(ZenError::NotSupported)
        );
        assert_eq!(
            properties.get_array(bias, PropertyType::Int32),
            Err(ZenError::WrongDataType)
        );

        let radius = ImuProperty::FieldRadius.tag();
        assert!(!properties.is_array(radius));
        assert_eq!(properties.get_float(radius), Err(ZenError::NotSupported));
        assert_eq!(
            properties.set_float(ImuProperty::CentricCompensationRate.tag(), 0.5),
            Err(ZenError::NotSupported)
        );

        let preset = ImuProperty::FilterPreset.tag();
        assert_eq!(properties.property_type(preset), PropertyType::Int32);
        assert_eq!(properties.get_int32(preset), Err(ZenError::NotSupported));
        assert_eq!(properties.set_int32(preset, 1), Err(ZenError::NotSupported));

        assert!(rig.device.received_functions().is_empty());
    }

    #[test]
    fn test_failed_read_restores_stream() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let properties = loaded(&rig);
        properties.set_bool(ImuProperty::StreamData.tag(), true).unwrap();
        rig.device.update(|state| {
            state.registers.remove(&91);
        });

        // the device acks the getter instead of answering it
        assert!(properties.get_int32(ImuProperty::FilterMode.tag()).is_err());
        assert!(rig.stream.is_streaming());
        assert!(rig.device.is_streaming());
    }
}
