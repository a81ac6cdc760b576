//! GNSS component of Ig1P devices
//!
//! Samples are a concatenation of the enabled u-blox NAV-PVT, NAV-ATT and
//! ESF-STATUS fields, in the order of their output flags and with the
//! receiver's native widths.

use std::sync::Arc;

use contracts::{
    CarrierPhaseSolution, EventPayload, FixType, GnssProperty, GnssSample, SensorInitError, ZenError,
    ZenResult, COMPONENT_GNSS,
};
use ingestion::opcodes::OpcodeV1;
use tracing::{debug, info, warn};

use crate::component::SensorComponent;
use crate::parsing::PayloadReader;
use crate::properties::{gnss_bit, Ig1GnssProperties, Properties};

const DEG_1E7: f64 = 1e-7;
const DEG_1E5: f64 = 1e-5;
const MILLI: f64 = 1e-3;

/// Wire width in bytes and signedness of a field.
fn layout(property: GnssProperty) -> (usize, bool) {
    use GnssProperty as P;

    match property {
        P::OutputNavPvtMonth
        | P::OutputNavPvtDay
        | P::OutputNavPvtHour
        | P::OutputNavPvtMinute
        | P::OutputNavPvtSecond
        | P::OutputNavPvtValid
        | P::OutputNavPvtFixType
        | P::OutputNavPvtFlags
        | P::OutputNavPvtFlags2
        | P::OutputNavPvtNumSv
        | P::OutputNavAttVersion
        | P::OutputEsfStatusVersion
        | P::OutputEsfStatusInitStatus1
        | P::OutputEsfStatusInitStatus2
        | P::OutputEsfStatusFusionMode
        | P::OutputEsfStatusNumSens => (1, false),
        P::OutputNavPvtYear | P::OutputNavPvtPDop => (2, false),
        P::OutputNavPvtNano
        | P::OutputNavPvtLongitude
        | P::OutputNavPvtLatitude
        | P::OutputNavPvtHeight
        | P::OutputNavPvtHMsl
        | P::OutputNavPvtVelN
        | P::OutputNavPvtVelE
        | P::OutputNavPvtVelD
        | P::OutputNavPvtGSpeed
        | P::OutputNavPvtHeadMot
        | P::OutputNavPvtHeadVeh
        | P::OutputNavAttRoll
        | P::OutputNavAttPitch
        | P::OutputNavAttHeading => (4, true),
        _ => (4, false),
    }
}

fn read_field(reader: &mut PayloadReader<'_>, property: GnssProperty) -> ZenResult<i64> {
    Ok(match layout(property) {
        (1, _) => i64::from(reader.u8()?),
        (2, _) => i64::from(reader.u16()?),
        (_, true) => i64::from(reader.i32()?),
        (_, false) => i64::from(reader.u32()?),
    })
}

/// Store a raw field value in its sample slot. Fields without a slot are
/// only consumed.
fn apply(sample: &mut GnssSample, property: GnssProperty, raw: i64) {
    use GnssProperty as P;

    let value = raw as f64;
    match property {
        P::OutputNavPvtITow => sample.timestamp = value * MILLI,
        P::OutputNavPvtYear => sample.year = raw as u16,
        P::OutputNavPvtMonth => sample.month = raw as u8,
        P::OutputNavPvtDay => sample.day = raw as u8,
        P::OutputNavPvtHour => sample.hour = raw as u8,
        P::OutputNavPvtMinute => sample.minute = raw as u8,
        P::OutputNavPvtSecond => sample.second = raw as u8,
        P::OutputNavPvtNano => sample.nano_second_correction = raw as i32,
        P::OutputNavPvtFixType => sample.fix_type = FixType::from_u8(raw as u8),
        P::OutputNavPvtFlags => sample.carrier_phase_solution = CarrierPhaseSolution::from_flags(raw as u8),
        P::OutputNavPvtNumSv => sample.num_satellites = raw as u8,
        P::OutputNavPvtLongitude => sample.longitude = value * DEG_1E7,
        P::OutputNavPvtLatitude => sample.latitude = value * DEG_1E7,
        P::OutputNavPvtHeight => sample.height = value * MILLI,
        P::OutputNavPvtHAcc => sample.horizontal_accuracy = value * MILLI,
        P::OutputNavPvtVAcc => sample.vertical_accuracy = value * MILLI,
        P::OutputNavPvtGSpeed => sample.velocity = value * MILLI,
        P::OutputNavPvtSAcc => sample.velocity_accuracy = value * MILLI,
        P::OutputNavPvtHeadMot => sample.heading_of_motion = value * DEG_1E5,
        P::OutputNavPvtHeadAcc => sample.heading_accuracy = value * DEG_1E5,
        P::OutputNavPvtHeadVeh => sample.heading_of_vehicle = value * DEG_1E5,
        _ => {}
    }
}

/// Parse one GNSS sample against the 64-bit output bitset.
pub fn parse_sample(payload: &[u8], bitset: u64) -> ZenResult<GnssSample> {
    let mut reader = PayloadReader::new(payload);
    let mut sample = GnssSample::default();
    for &property in GnssProperty::ALL {
        let Some(bit) = gnss_bit(property) else {
            continue;
        };
        if bitset & (1 << bit) == 0 {
            continue;
        }
        let raw = read_field(&mut reader, property)?;
        apply(&mut sample, property, raw);
    }
    if reader.remaining() != 0 {
        debug!(trailing = reader.remaining(), "gnss sample longer than its bitset");
        return Err(ZenError::IoMsgCorrupt);
    }
    Ok(sample)
}

pub struct GnssComponent {
    properties: Arc<Ig1GnssProperties>,
}

impl GnssComponent {
    pub fn new(properties: Arc<Ig1GnssProperties>) -> Self {
        Self { properties }
    }
}

impl SensorComponent for GnssComponent {
    fn kind(&self) -> &'static str {
        COMPONENT_GNSS
    }

    fn properties(&self) -> Arc<dyn Properties> {
        self.properties.clone()
    }

    fn init(&self) -> Result<(), SensorInitError> {
        self.properties.load().map_err(|error| {
            warn!(%error, "gnss state not readable");
            SensorInitError::RetrieveFailed
        })
    }

    /// Without a saved state the receiver cold-starts on the next power up.
    fn close(&self) -> ZenResult<()> {
        self.properties.save_state().map_err(|error| {
            warn!(%error, "could not persist gnss state");
            ZenError::IoSendFailed
        })?;
        info!("gnss state persisted");
        Ok(())
    }

    fn process_data(&self, _function: u8, _payload: &[u8]) -> ZenResult<()> {
        Err(ZenError::IoUnsupportedFunction)
    }

    fn sample_function(&self) -> u8 {
        OpcodeV1::GetRawGpsSensorData.code()
    }

    fn parse_sample(&self, payload: &[u8]) -> ZenResult<EventPayload> {
        parse_sample(payload, self.properties.output_bitset()).map(EventPayload::Gnss)
    }

    fn forward_rtk_correction(&self, data: &[u8]) -> ZenResult<()> {
        self.properties.forward_rtk_correction(data)
    }
}
