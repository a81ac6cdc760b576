//! Legacy (V0) IMU component

use std::sync::Arc;

use contracts::{EventPayload, ImuProperty, ImuSample, SensorInitError, ZenResult, COMPONENT_IMU};
use ingestion::opcodes::OpcodeV0;
use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use tracing::{debug, warn};

use crate::component::SensorComponent;
use crate::parsing::PayloadReader;
use crate::properties::{legacy_imu_bit, Calibration, LegacyImuProperties, Properties};

/// Fixed-point divisors of low-precision samples.
mod divisor {
    pub const GYR: f32 = 1000.0;
    pub const ACC: f32 = 1000.0;
    pub const MAG: f32 = 100.0;
    pub const ANGULAR_VEL: f32 = 1000.0;
    pub const QUAT: f32 = 10000.0;
    pub const EULER: f32 = 10000.0;
    pub const LINEAR_ACC: f32 = 1000.0;
    pub const PRESSURE: f32 = 100.0;
    pub const ALTITUDE: f32 = 10.0;
    pub const TEMPERATURE: f32 = 100.0;
    pub const HEAVE: f32 = 1000.0;
}

fn degrees(values: [f32; 3]) -> [f32; 3] {
    values.map(f32::to_degrees)
}

fn row_major(matrix: &Matrix3<f32>) -> [f32; 9] {
    let mut out = [0.0; 9];
    for (index, value) in out.iter_mut().enumerate() {
        *value = matrix[(index / 3, index % 3)];
    }
    out
}

/// `alignment · raw + bias`
fn aligned(alignment: &[f32; 9], raw: [f32; 3], bias: &[f32; 3]) -> [f32; 3] {
    let corrected = Matrix3::from_row_slice(alignment) * Vector3::from(raw) + Vector3::from(*bias);
    corrected.into()
}

/// `softIron · (raw − hardIron)`
fn iron_corrected(soft_iron: &[f32; 9], raw: [f32; 3], hard_iron: &[f32; 3]) -> [f32; 3] {
    let corrected = Matrix3::from_row_slice(soft_iron) * (Vector3::from(raw) - Vector3::from(*hard_iron));
    corrected.into()
}

/// Rotation matrix of a `[w, x, y, z]` quaternion; `None` for a zero quaternion.
pub(crate) fn rotation_matrix(q: [f32; 4]) -> Option<[f32; 9]> {
    let rotation = UnitQuaternion::try_new(Quaternion::new(q[0], q[1], q[2], q[3]), f32::EPSILON)?;
    Some(row_major(rotation.to_rotation_matrix().matrix()))
}

/// Parse one legacy sample.
///
/// The payload starts with the frame counter; each enabled output follows in
/// fixed order, as 4-byte floats or as 2-byte fixed point in low-precision
/// mode.
pub fn parse_sample(
    payload: &[u8],
    bitset: u32,
    sampling_rate: u32,
    calibration: &Calibration,
) -> ZenResult<ImuSample> {
    let enabled = |property: ImuProperty| {
        legacy_imu_bit(property).is_some_and(|bit| bitset & (1 << bit) != 0)
    };
    let low = enabled(ImuProperty::OutputLowPrecision);
    let mut reader = PayloadReader::new(payload);
    let mut sample = ImuSample::default();

    let frame_count = reader.u32()?;
    sample.frame_count = frame_count as i32;
    sample.timestamp = f64::from(frame_count) / f64::from(sampling_rate.max(1));

    if enabled(ImuProperty::OutputRawGyr) {
        sample.g_raw = degrees(reader.scaled(low, divisor::GYR)?);
        sample.g = aligned(&calibration.gyr_alignment, sample.g_raw, &calibration.gyr_bias);
    }
    if enabled(ImuProperty::OutputRawAcc) {
        sample.a_raw = reader.scaled(low, divisor::ACC)?;
        sample.a = aligned(&calibration.acc_alignment, sample.a_raw, &calibration.acc_bias);
    }
    if enabled(ImuProperty::OutputRawMag) {
        sample.b_raw = reader.scaled(low, divisor::MAG)?;
        sample.b = iron_corrected(&calibration.soft_iron, sample.b_raw, &calibration.hard_iron);
    }
    if enabled(ImuProperty::OutputAngularVel) {
        sample.w = degrees(reader.scaled(low, divisor::ANGULAR_VEL)?);
    }
    if enabled(ImuProperty::OutputQuat) {
        sample.q = reader.scaled(low, divisor::QUAT)?;
        if let Some(rotation) = rotation_matrix(sample.q) {
            sample.rotation_m = rotation;
        }
    }
    if enabled(ImuProperty::OutputEuler) {
        sample.r = degrees(reader.scaled(low, divisor::EULER)?);
    }
    if enabled(ImuProperty::OutputLinearAcc) {
        sample.lin_acc = reader.scaled(low, divisor::LINEAR_ACC)?;
    }
    if enabled(ImuProperty::OutputPressure) {
        [sample.pressure] = reader.scaled(low, divisor::PRESSURE)?;
    }
    if enabled(ImuProperty::OutputAltitude) {
        [sample.altitude] = reader.scaled(low, divisor::ALTITUDE)?;
    }
    if enabled(ImuProperty::OutputTemperature) {
        [sample.temperature] = reader.scaled(low, divisor::TEMPERATURE)?;
    }
    if enabled(ImuProperty::OutputHeaveMotion) {
        [sample.heave_motion] = reader.scaled(low, divisor::HEAVE)?;
    }
    Ok(sample)
}

pub struct LegacyImuComponent {
    properties: Arc<LegacyImuProperties>,
}

impl LegacyImuComponent {
    pub fn new(properties: Arc<LegacyImuProperties>) -> Self {
        Self { properties }
    }
}

impl SensorComponent for LegacyImuComponent {
    fn kind(&self) -> &'static str {
        COMPONENT_IMU
    }

    fn properties(&self) -> Arc<dyn Properties> {
        self.properties.clone()
    }

    fn init(&self) -> Result<(), SensorInitError> {
        self.properties.load().map_err(|error| {
            warn!(%error, "legacy imu state not readable");
            SensorInitError::RetrieveFailed
        })?;
        self.properties
            .channel()
            .stream()
            .set_streaming(true)
            .map_err(|_| SensorInitError::RetrieveFailed)?;
        debug!("legacy imu ready");
        Ok(())
    }

    fn process_data(&self, function: u8, payload: &[u8]) -> ZenResult<()> {
        self.properties.process_reply(function, payload)
    }

    fn sample_function(&self) -> u8 {
        OpcodeV0::GetRawSensorData.code()
    }

    fn parse_sample(&self, payload: &[u8]) -> ZenResult<EventPayload> {
        let sample = parse_sample(
            payload,
            self.properties.output_bitset(),
            self.properties.sampling_rate(),
            &self.properties.calibration(),
        )?;
        Ok(EventPayload::Imu(sample))
    }
}
