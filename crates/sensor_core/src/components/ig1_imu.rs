//! Ig1 IMU component

use std::sync::Arc;

use contracts::{EventPayload, ImuProperty, ImuSample, SensorInitError, ZenResult, COMPONENT_IMU};
use ingestion::opcodes::OpcodeV1;
use tracing::{debug, warn};

use super::legacy_imu::rotation_matrix;
use crate::component::SensorComponent;
use crate::parsing::PayloadReader;
use crate::properties::{ig1_imu_bit, Ig1ImuProperties, Properties};

/// Timestamp tick rate of Ig1 firmware, independent of the output rate.
pub const IG1_TICK_RATE: f64 = 500.0;

/// Wire order of Ig1 sample fields with their float count.
const FIELDS: [(ImuProperty, usize); 17] = [
    (ImuProperty::OutputRawAcc, 3),
    (ImuProperty::OutputAccCalibrated, 3),
    (ImuProperty::OutputRawGyr0, 3),
    (ImuProperty::OutputRawGyr1, 3),
    (ImuProperty::OutputGyr0BiasCalib, 3),
    (ImuProperty::OutputGyr1BiasCalib, 3),
    (ImuProperty::OutputGyr0AlignCalib, 3),
    (ImuProperty::OutputGyr1AlignCalib, 3),
    (ImuProperty::OutputRawMag, 3),
    (ImuProperty::OutputMagCalib, 3),
    (ImuProperty::OutputAngularVel, 3),
    (ImuProperty::OutputQuat, 4),
    (ImuProperty::OutputEuler, 3),
    (ImuProperty::OutputLinearAcc, 3),
    (ImuProperty::OutputPressure, 1),
    (ImuProperty::OutputAltitude, 1),
    (ImuProperty::OutputTemperature, 1),
];

/// Where a parsed field lands; `None` fields are consumed but not exposed.
fn target(sample: &mut ImuSample, property: ImuProperty) -> Option<&mut [f32]> {
    use ImuProperty as P;

    let slot = match property {
        P::OutputRawAcc => &mut sample.a_raw[..],
        P::OutputAccCalibrated => &mut sample.a[..],
        P::OutputRawGyr0 => &mut sample.g_raw[..],
        // alignment output already includes the static calibration
        P::OutputGyr0AlignCalib => &mut sample.g[..],
        P::OutputRawMag => &mut sample.b_raw[..],
        P::OutputMagCalib => &mut sample.b[..],
        P::OutputAngularVel => &mut sample.w[..],
        P::OutputQuat => &mut sample.q[..],
        P::OutputEuler => &mut sample.r[..],
        P::OutputLinearAcc => &mut sample.lin_acc[..],
        P::OutputPressure => std::slice::from_mut(&mut sample.pressure),
        P::OutputAltitude => std::slice::from_mut(&mut sample.altitude),
        P::OutputTemperature => std::slice::from_mut(&mut sample.temperature),
        _ => return None,
    };
    Some(slot)
}

/// Parse one Ig1 sample: a tick counter followed by the enabled fields as
/// 4-byte floats.
pub fn parse_sample(payload: &[u8], bitset: u32) -> ZenResult<ImuSample> {
    let mut reader = PayloadReader::new(payload);
    let mut sample = ImuSample::default();

    let ticks = reader.u32()?;
    sample.frame_count = ticks as i32;
    sample.timestamp = f64::from(ticks) / IG1_TICK_RATE;

    for (property, len) in FIELDS {
        let enabled = ig1_imu_bit(property).is_some_and(|bit| bitset & (1 << bit) != 0);
        if !enabled {
            continue;
        }
        let mut values = [0.0f32; 4];
        for value in &mut values[..len] {
            *value = reader.f32()?;
        }
        if let Some(slot) = target(&mut sample, property) {
            slot.copy_from_slice(&values[..len]);
        }
    }

    if let Some(rotation) = rotation_matrix(sample.q) {
        sample.rotation_m = rotation;
    }
    Ok(sample)
}

pub struct Ig1ImuComponent {
    properties: Arc<Ig1ImuProperties>,
}

impl Ig1ImuComponent {
    pub fn new(properties: Arc<Ig1ImuProperties>) -> Self {
        Self { properties }
    }
}

impl SensorComponent for Ig1ImuComponent {
    fn kind(&self) -> &'static str {
        COMPONENT_IMU
    }

    fn properties(&self) -> Arc<dyn Properties> {
        self.properties.clone()
    }

    fn init(&self) -> Result<(), SensorInitError> {
        self.properties.load().map_err(|error| {
            warn!(%error, "ig1 imu state not readable");
            SensorInitError::RetrieveFailed
        })?;
        // setup is done, back to streaming
        self.properties
            .channel()
            .stream()
            .set_streaming(true)
            .map_err(|_| SensorInitError::RetrieveFailed)?;
        debug!("ig1 imu ready");
        Ok(())
    }

    fn process_data(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        self.properties.process_reply(function, payload)
    }

    fn sample_function(&self) -> u8 {
        OpcodeV1::GetRawImuSensorData.code()
    }

    fn parse_sample(&self, payload: &[u8]) -> ZenResult<EventPayload> {
        parse_sample(payload, self.properties.output_bitset()).map(EventPayload::Imu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ZenError;

    fn payload(ticks: u32, values: &[f32]) -> Vec<u8> {
        let mut bytes = ticks.to_le_bytes().to_vec();
        for value in values {
            bytes.extend(value.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_timestamp_at_500_hz() {
        let sample = parse_sample(&payload(1000, &[0.1, 0.2, 9.8]), 1).unwrap();
        assert_eq!(sample.timestamp, 2.0);
        assert_eq!(sample.a_raw, [0.1, 0.2, 9.8]);
    }

    #[test]
    fn test_unexposed_fields_are_skipped() {
        // raw gyr 1 (bit 3), then gyr 0 alignment (bit 6), then temperature (bit 16)
        let bitset = (1 << 3) | (1 << 6) | (1 << 16);
        let bytes = payload(0, &[9.0, 9.0, 9.0, 1.0, 2.0, 3.0, 36.5]);
        let sample = parse_sample(&bytes, bitset).unwrap();
        assert_eq!(sample.g, [1.0, 2.0, 3.0]);
        assert_eq!(sample.g_raw, [0.0; 3]);
        assert_eq!(sample.temperature, 36.5);
    }

    #[test]
    fn test_quaternion_and_linear_acc() {
        let bitset = (1 << 11) | (1 << 13);
        let bytes = payload(0, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, -9.81]);
        let sample = parse_sample(&bytes, bitset).unwrap();
        assert_eq!(sample.q, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(sample.rotation_m, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(sample.lin_acc, [0.0, 0.0, -9.81]);
    }

    #[test]
    fn test_short_payload() {
        assert_eq!(parse_sample(&payload(0, &[1.0]), 1), Err(ZenError::IoMsgCorrupt));
        assert_eq!(parse_sample(&[1, 2], 0), Err(ZenError::IoMsgCorrupt));
    }
}
