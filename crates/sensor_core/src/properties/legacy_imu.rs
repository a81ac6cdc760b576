//! IMU properties of legacy devices
//!
//! Besides forwarding reads and writes to the firmware, this object owns the
//! caches the sample parser depends on: the output data bitset, the sampling
//! rate (the firmware has no getter for it) and the calibration used to
//! correct raw readings.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use contracts::{
    ImuProperty, PropertyRule, PropertyTag, PropertyType, PropertyValue, ZenError, ZenResult,
};
use ingestion::opcodes::{InternalOpcode, OpcodeV0};
use ingestion::SyncedCommunicator;
use tracing::debug;

use super::value_map::{
    ValueMap, ACC_RANGES, GYR_RANGES, LEGACY_CAN_BAUD_RATES, LEGACY_CAN_HEARTBEATS,
    LEGACY_UART_BAUD_RATES, MAG_RANGES, SAMPLING_RATES,
};
use super::{array_bytes, rules, ChangeNotifier, DeviceChannel, Properties};
use crate::parsing::{read_value, read_vec};

/// Sampling rate assumed until the host sets one.
pub const DEFAULT_SAMPLING_RATE: u32 = 200;

/// Bit of an output flag in the legacy bitset.
pub fn legacy_imu_bit(property: ImuProperty) -> Option<u32> {
    use ImuProperty as P;

    let bit = match property {
        P::OutputPressure => 9,
        P::OutputRawMag => 10,
        P::OutputRawAcc => 11,
        P::OutputRawGyr => 12,
        P::OutputTemperature => 13,
        P::OutputHeaveMotion => 14,
        P::OutputAngularVel => 16,
        P::OutputEuler => 17,
        P::OutputQuat => 18,
        P::OutputAltitude => 19,
        P::OutputLinearAcc => 21,
        P::OutputLowPrecision => 22,
        _ => return None,
    };
    Some(bit)
}

/// Calibration applied to raw readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub acc_alignment: [f32; 9],
    pub acc_bias: [f32; 3],
    pub gyr_alignment: [f32; 9],
    pub gyr_bias: [f32; 3],
    pub soft_iron: [f32; 9],
    pub hard_iron: [f32; 3],
}

const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl Default for Calibration {
    fn default() -> Self {
        Self {
            acc_alignment: IDENTITY,
            acc_bias: [0.0; 3],
            gyr_alignment: IDENTITY,
            gyr_bias: [0.0; 3],
            soft_iron: IDENTITY,
            hard_iron: [0.0; 3],
        }
    }
}

/// (getter, setter, element count) of a float array property.
fn float_array(property: ImuProperty) -> Option<(OpcodeV0, OpcodeV0, usize)> {
    use ImuProperty as P;
    use OpcodeV0 as Op;

    let entry = match property {
        P::AccAlignment => (Op::GetAccAlignment, Op::SetAccAlignment, 9),
        P::GyrAlignment => (Op::GetGyrAlignment, Op::SetGyrAlignment, 9),
        P::MagAlignment => (Op::GetMagAlignment, Op::SetMagAlignment, 9),
        P::MagSoftIronMatrix => (Op::GetMagSoftIronMatrix, Op::SetMagSoftIronMatrix, 9),
        P::AccBias => (Op::GetAccBias, Op::SetAccBias, 3),
        P::GyrBias => (Op::GetGyrBias, Op::SetGyrBias, 3),
        P::MagBias => (Op::GetMagBias, Op::SetMagBias, 3),
        P::MagReference => (Op::GetMagReference, Op::SetMagReference, 3),
        P::MagHardIronOffset => (Op::GetMagHardIronOffset, Op::SetMagHardIronOffset, 3),
        _ => return None,
    };
    Some(entry)
}

/// (getter, setter, map) of an integer property. Set-only properties have
/// no getter.
fn int_property(property: ImuProperty) -> Option<(Option<OpcodeV0>, OpcodeV0, Option<ValueMap>)> {
    use ImuProperty as P;
    use OpcodeV0 as Op;

    let entry = match property {
        P::FilterMode => (Some(Op::GetFilterMode), Op::SetFilterMode, None),
        P::FilterPreset => (Some(Op::GetFilterPreset), Op::SetFilterPreset, None),
        P::AccRange => (Some(Op::GetAccRange), Op::SetAccRange, Some(ACC_RANGES)),
        P::GyrRange => (Some(Op::GetGyrRange), Op::SetGyrRange, Some(GYR_RANGES)),
        P::MagRange => (Some(Op::GetMagRange), Op::SetMagRange, Some(MAG_RANGES)),
        P::CanHeartbeat => (Some(Op::GetCanHeartbeat), Op::SetCanHeartbeat, Some(LEGACY_CAN_HEARTBEATS)),
        P::UartBaudRate => (Some(Op::GetBaudRate), Op::SetBaudRate, Some(LEGACY_UART_BAUD_RATES)),
        P::OrientationOffsetMode => (None, Op::SetOrientationOffsetMode, None),
        P::CanStartId => (None, Op::SetCanStartId, None),
        P::CanBaudRate => (None, Op::SetCanBaudRate, Some(LEGACY_CAN_BAUD_RATES)),
        P::UartFormat => (None, Op::SetUartFormat, None),
        _ => return None,
    };
    Some(entry)
}

pub struct LegacyImuProperties {
    channel: DeviceChannel,
    notifier: ChangeNotifier,
    output_bitset: AtomicU32,
    sampling_rate: AtomicU32,
    gyr_auto_calibration: AtomicBool,
    calibration: Mutex<Calibration>,
}

impl LegacyImuProperties {
    pub fn new(channel: DeviceChannel) -> Self {
        Self {
            channel,
            notifier: ChangeNotifier::new(),
            output_bitset: AtomicU32::new(0),
            sampling_rate: AtomicU32::new(DEFAULT_SAMPLING_RATE),
            gyr_auto_calibration: AtomicBool::new(false),
            calibration: Mutex::new(Calibration::default()),
        }
    }

    pub fn output_bitset(&self) -> u32 {
        self.output_bitset.load(Ordering::Acquire)
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate.load(Ordering::Acquire)
    }

    pub fn calibration(&self) -> Calibration {
        *self.calibration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channel(&self) -> &DeviceChannel {
        &self.channel
    }

    /// Fill the caches from the device.
    pub fn load(&self) -> ZenResult<()> {
        let read9 = |op: OpcodeV0| -> ZenResult<[f32; 9]> {
            let values = self.channel.read_array::<f32>(op.code(), 9)?;
            values.try_into().map_err(|_| ZenError::IoMsgCorrupt)
        };
        let read3 = |op: OpcodeV0| -> ZenResult<[f32; 3]> {
            let values = self.channel.read_array::<f32>(op.code(), 3)?;
            values.try_into().map_err(|_| ZenError::IoMsgCorrupt)
        };
        let calibration = Calibration {
            acc_alignment: read9(OpcodeV0::GetAccAlignment)?,
            acc_bias: read3(OpcodeV0::GetAccBias)?,
            gyr_alignment: read9(OpcodeV0::GetGyrAlignment)?,
            gyr_bias: read3(OpcodeV0::GetGyrBias)?,
            soft_iron: read9(OpcodeV0::GetMagSoftIronMatrix)?,
            hard_iron: read3(OpcodeV0::GetMagHardIronOffset)?,
        };
        *self.calibration.lock().unwrap_or_else(PoisonError::into_inner) = calibration;

        let bitset = self.channel.read::<u32>(InternalOpcode::Config.code())?;
        self.output_bitset.store(bitset, Ordering::Release);
        debug!(bitset = format_args!("{bitset:#010x}"), "legacy imu state loaded");
        Ok(())
    }

    /// Publish a component-level reply to the waiting caller.
    pub fn process_reply(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        use OpcodeV0 as Op;

        let synced: &SyncedCommunicator = self.channel.stream().synced();
        let Some(op) = Op::from_code(function) else {
            return Err(ZenError::IoUnsupportedFunction);
        };
        let property = u32::from(function);
        match op {
            Op::GetAccAlignment
            | Op::GetAccBias
            | Op::GetGyrAlignment
            | Op::GetGyrBias
            | Op::GetMagAlignment
            | Op::GetMagBias
            | Op::GetMagReference
            | Op::GetMagHardIronOffset
            | Op::GetMagSoftIronMatrix => {
                let values = read_vec::<f32>(payload);
                synced.publish_array(property, values.as_deref().map_err(|error| *error));
            }
            Op::GetFieldRadius | Op::GetCentricCompensationRate => {
                synced.publish_result(property, read_value::<f32>(payload));
            }
            Op::GetFilterMode
            | Op::GetFilterPreset
            | Op::GetAccRange
            | Op::GetGyrRange
            | Op::GetMagRange
            | Op::GetCanHeartbeat
            | Op::GetLinearCompensationRate
            | Op::GetBaudRate => {
                synced.publish_result(property, read_value::<u32>(payload));
            }
            _ => return Err(ZenError::IoUnsupportedFunction),
        }
        Ok(())
    }

    fn set_output_bit(&self, property: ImuProperty, bit: u32, enable: bool) -> ZenResult<()> {
        let section = self.channel.quiesce()?;
        let current = self.output_bitset();
        let mask = if enable { current | (1 << bit) } else { current & !(1 << bit) };
        let (function, value) = if property == ImuProperty::OutputLowPrecision {
            (OpcodeV0::SetDataMode.code(), u32::from(enable))
        } else {
            (OpcodeV0::SetTransmitData.code(), mask)
        };
        self.channel.write_in(&section, function, &value.to_le_bytes())?;
        self.output_bitset.store(mask, Ordering::Release);
        drop(section);
        debug!(?property, mask = format_args!("{mask:#010x}"), "output bitset updated");
        Ok(())
    }

    fn update_calibration(&self, property: ImuProperty, values: &[f32]) {
        let mut calibration = self.calibration.lock().unwrap_or_else(PoisonError::into_inner);
        let target: &mut [f32] = match property {
            ImuProperty::AccAlignment => &mut calibration.acc_alignment,
            ImuProperty::AccBias => &mut calibration.acc_bias,
            ImuProperty::GyrAlignment => &mut calibration.gyr_alignment,
            ImuProperty::GyrBias => &mut calibration.gyr_bias,
            ImuProperty::MagSoftIronMatrix => &mut calibration.soft_iron,
            ImuProperty::MagHardIronOffset => &mut calibration.hard_iron,
            _ => return,
        };
        target.copy_from_slice(values);
    }
}

impl Properties for LegacyImuProperties {
    fn rule(&self, tag: PropertyTag) -> PropertyRule {
        rules::legacy_imu(tag)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    fn execute(&self, tag: PropertyTag) -> ZenResult<()> {
        self.check_command(tag)?;
        match ImuProperty::try_from(tag)? {
            // the reply is a sample frame, not an ack
            ImuProperty::PollSensorData => self
                .channel
                .send_unacked(OpcodeV0::GetRawSensorData.code(), &[]),
            ImuProperty::CalibrateGyro => self.channel.command(OpcodeV0::StartGyroCalibration.code()),
            ImuProperty::ResetOrientationOffset => {
                self.channel.command(OpcodeV0::ResetOrientationOffset.code())
            }
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn get_array(&self, tag: PropertyTag, ty: PropertyType) -> ZenResult<PropertyValue> {
        self.check_read(tag, ty, true)?;
        let property = ImuProperty::try_from(tag)?;
        if let Some((getter, _, len)) = float_array(property) {
            return self
                .channel
                .read_array::<f32>(getter.code(), len)
                .map(PropertyValue::FloatArray);
        }
        let supported = |map: ValueMap| Ok(PropertyValue::Int32Array(map.supported().to_vec()));
        match property {
            ImuProperty::SupportedSamplingRates => supported(SAMPLING_RATES),
            ImuProperty::AccSupportedRanges => supported(ACC_RANGES),
            ImuProperty::GyrSupportedRanges => supported(GYR_RANGES),
            ImuProperty::MagSupportedRanges => supported(MAG_RANGES),
            ImuProperty::SupportedFilterModes => Ok(PropertyValue::Bytes(rules::supported_filter_modes())),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_array(&self, tag: PropertyTag, value: &PropertyValue) -> ZenResult<()> {
        self.check_write(tag, value.property_type(), true)?;
        let property = ImuProperty::try_from(tag)?;
        let (_, setter, len) = float_array(property).ok_or(ZenError::UnknownProperty)?;
        let values = value.as_float_array().ok_or(ZenError::WrongDataType)?;
        if values.len() != len {
            return Err(ZenError::InvalidArgument);
        }
        self.channel.write(setter.code(), &array_bytes(value)?)?;
        self.update_calibration(property, values);
        self.notifier.notify(tag, value);
        Ok(())
    }

    fn get_bool(&self, tag: PropertyTag) -> ZenResult<bool> {
        self.check_read(tag, PropertyType::Bool, false)?;
        let property = ImuProperty::try_from(tag)?;
        if let Some(bit) = legacy_imu_bit(property) {
            return Ok(self.output_bitset() & (1 << bit) != 0);
        }
        match property {
            ImuProperty::StreamData => Ok(self.channel.stream().is_streaming()),
            ImuProperty::GyrUseAutoCalibration => Ok(self.gyr_auto_calibration.load(Ordering::Acquire)),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_bool(&self, tag: PropertyTag, value: bool) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Bool, false)?;
        let property = ImuProperty::try_from(tag)?;
        if let Some(bit) = legacy_imu_bit(property) {
            self.set_output_bit(property, bit, value)?;
        } else {
            match property {
                ImuProperty::StreamData => {
                    self.channel.stream().set_streaming(value)?;
                }
                ImuProperty::GyrUseAutoCalibration => {
                    self.channel
                        .write_u32(OpcodeV0::SetGyrUseAutoCalibration.code(), u32::from(value))?;
                    self.gyr_auto_calibration.store(value, Ordering::Release);
                }
                _ => return Err(ZenError::UnknownProperty),
            }
        }
        self.notifier.notify(tag, &PropertyValue::Bool(value));
        Ok(())
    }

    fn get_float(&self, tag: PropertyTag) -> ZenResult<f32> {
        self.check_read(tag, PropertyType::Float, false)?;
        match ImuProperty::try_from(tag)? {
            ImuProperty::CentricCompensationRate => {
                self.channel.read(OpcodeV0::GetCentricCompensationRate.code())
            }
            ImuProperty::LinearCompensationRate => self
                .channel
                .read::<u32>(OpcodeV0::GetLinearCompensationRate.code())
                .map(|rate| rate as f32),
            ImuProperty::FieldRadius => self.channel.read(OpcodeV0::GetFieldRadius.code()),
            _ => Err(ZenError::UnknownProperty),
        }
    }

    fn set_float(&self, tag: PropertyTag, value: f32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Float, false)?;
        match ImuProperty::try_from(tag)? {
            ImuProperty::CentricCompensationRate => {
                let enabled = u32::from(value != 0.0);
                self.channel
                    .write_u32(OpcodeV0::SetCentricCompensationRate.code(), enabled)?;
            }
            ImuProperty::LinearCompensationRate => {
                self.channel
                    .write_u32(OpcodeV0::SetLinearCompensationRate.code(), value.round().max(0.0) as u32)?;
            }
            ImuProperty::FieldRadius => {
                self.channel.write_floats(OpcodeV0::SetFieldRadius.code(), &[value])?;
            }
            _ => return Err(ZenError::UnknownProperty),
        }
        self.notifier.notify(tag, &PropertyValue::Float(value));
        Ok(())
    }

    fn get_int32(&self, tag: PropertyTag) -> ZenResult<i32> {
        self.check_read(tag, PropertyType::Int32, false)?;
        let property = ImuProperty::try_from(tag)?;
        if property == ImuProperty::SamplingRate {
            return Ok(self.sampling_rate() as i32);
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
        let applied = if property == ImuProperty::SamplingRate {
            let rate = SAMPLING_RATES.round_up(value);
            let section = self.channel.quiesce()?;
            let wire = SAMPLING_RATES.encode(rate);
            self.channel
                .write_in(&section, OpcodeV0::SetSamplingRate.code(), &wire.to_le_bytes())?;
            // sample timestamps derive from this rate
            self.sampling_rate.store(rate as u32, Ordering::Release);
            drop(section);
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
