//! Property rulebooks
//!
//! Pure data: which tags a properties object knows and how they are shaped.
//! The properties implementations consult these tables before touching the
//! device, so metadata queries never cost a round-trip.

use contracts::{GnssProperty, ImuProperty, PropertyRule, PropertyTag, PropertyType, SensorProperty};
use serde_json::json;

use PropertyType::{Bool, Byte, Float, Int32};

/// Sensor-wide rules of legacy devices.
pub fn legacy_core(tag: PropertyTag) -> PropertyRule {
    use SensorProperty as P;

    let Ok(property) = P::try_from(tag) else {
        return PropertyRule::UNKNOWN;
    };
    match property {
        P::DeviceName | P::FirmwareInfo | P::SerialNumber => PropertyRule::constant_array(Byte),
        P::FirmwareVersion | P::SupportedBaudRates => PropertyRule::constant_array(Int32),
        P::BatteryCharging => PropertyRule::constant(Bool),
        P::BatteryLevel | P::BatteryVoltage => PropertyRule::constant(Float),
        P::BaudRate | P::DataMode | P::TimeOffset => PropertyRule::new(Int32),
        P::StoreSettingsInFlash | P::RestoreFactorySettings => PropertyRule::command(),
        P::SensorModel => PropertyRule::UNKNOWN,
    }
}

/// Sensor-wide rules of Ig1 devices. No battery, no data mode.
pub fn ig1_core(tag: PropertyTag) -> PropertyRule {
    use SensorProperty as P;

    let Ok(property) = P::try_from(tag) else {
        return PropertyRule::UNKNOWN;
    };
    match property {
        P::DeviceName | P::FirmwareInfo | P::SerialNumber | P::SensorModel => {
            PropertyRule::constant_array(Byte)
        }
        P::FirmwareVersion | P::SupportedBaudRates => PropertyRule::constant_array(Int32),
        P::BaudRate | P::TimeOffset => PropertyRule::new(Int32),
        P::StoreSettingsInFlash | P::RestoreFactorySettings => PropertyRule::command(),
        P::BatteryCharging | P::BatteryLevel | P::BatteryVoltage | P::DataMode => PropertyRule::UNKNOWN,
    }
}

/// Rules shared by both IMU generations.
fn imu_common(property: ImuProperty) -> Option<PropertyRule> {
    use ImuProperty as P;

    let rule = match property {
        P::StreamData => PropertyRule::new(Bool),
        P::SamplingRate
        | P::FilterMode
        | P::OrientationOffsetMode
        | P::AccRange
        | P::GyrRange
        | P::MagRange
        | P::CanStartId
        | P::CanBaudRate
        | P::CanHeartbeat
        | P::UartBaudRate
        | P::UartFormat => PropertyRule::new(Int32),
        P::SupportedSamplingRates
        | P::AccSupportedRanges
        | P::GyrSupportedRanges
        | P::MagSupportedRanges => PropertyRule::constant_array(Int32),
        P::SupportedFilterModes => PropertyRule::constant_array(Byte),
        P::PollSensorData | P::CalibrateGyro | P::ResetOrientationOffset => PropertyRule::command(),
        P::GyrUseAutoCalibration
        | P::OutputRawAcc
        | P::OutputRawGyr
        | P::OutputRawMag
        | P::OutputEuler
        | P::OutputQuat
        | P::OutputAngularVel
        | P::OutputLinearAcc
        | P::OutputAltitude
        | P::OutputPressure
        | P::OutputTemperature => PropertyRule::new(Bool),
        P::CentricCompensationRate | P::LinearCompensationRate | P::FieldRadius => PropertyRule::new(Float),
        P::FilterPreset => PropertyRule::new(Int32),
        P::AccAlignment
        | P::AccBias
        | P::GyrAlignment
        | P::GyrBias
        | P::MagAlignment
        | P::MagBias
        | P::MagReference
        | P::MagHardIronOffset
        | P::MagSoftIronMatrix => PropertyRule::array(Float),
        _ => return None,
    };
    Some(rule)
}

pub fn legacy_imu(tag: PropertyTag) -> PropertyRule {
    use ImuProperty as P;

    let Ok(property) = P::try_from(tag) else {
        return PropertyRule::UNKNOWN;
    };
    if let Some(rule) = imu_common(property) {
        return rule;
    }
    match property {
        P::OutputLowPrecision | P::OutputHeaveMotion => PropertyRule::new(Bool),
        _ => PropertyRule::UNKNOWN,
    }
}

/// Ig1 IMU rules; the second-gyro flags only exist on dual-gyro models.
pub fn ig1_imu(tag: PropertyTag, second_gyro: bool) -> PropertyRule {
    use ImuProperty as P;

    let Ok(property) = P::try_from(tag) else {
        return PropertyRule::UNKNOWN;
    };
    if let Some(rule) = imu_common(property) {
        return rule;
    }
    match property {
        P::GyrUseThreshold
        | P::DegRadOutput
        | P::OutputAccCalibrated
        | P::OutputRawGyr0
        | P::OutputGyr0BiasCalib
        | P::OutputGyr0AlignCalib
        | P::OutputMagCalib => PropertyRule::new(Bool),
        P::OutputRawGyr1 | P::OutputGyr1BiasCalib | P::OutputGyr1AlignCalib if second_gyro => {
            PropertyRule::new(Bool)
        }
        P::CanDataPrecision => PropertyRule::new(Int32),
        _ => PropertyRule::UNKNOWN,
    }
}

pub fn gnss(tag: PropertyTag) -> PropertyRule {
    match GnssProperty::try_from(tag) {
        Ok(_) => PropertyRule::new(Bool),
        Err(_) => PropertyRule::UNKNOWN,
    }
}

/// Placeholder for sensors fed by an event transport.
pub fn none(_tag: PropertyTag) -> PropertyRule {
    PropertyRule::UNKNOWN
}

const FILTER_MODES: [&str; 5] = [
    "Gyroscope filter",
    "Gyroscope & accelerometer filter",
    "Gyroscope, accelerometer & magnetometer filter",
    "Madgwick gyroscope & accelerometer filter",
    "Madgwick gyroscope, accelerometer & magnetometer filter",
];

/// JSON listing of the filter modes, as served by `SupportedFilterModes`.
pub fn supported_filter_modes() -> Vec<u8> {
    let config: Vec<_> = FILTER_MODES
        .iter()
        .enumerate()
        .map(|(value, key)| json!({ "key": key, "value": value }))
        .collect();
    json!({ "config": config }).to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_rules() {
        assert!(legacy_core(SensorProperty::BatteryLevel.tag()).is_constant);
        assert!(!ig1_core(SensorProperty::BatteryLevel.tag()).is_known());
        assert!(ig1_core(SensorProperty::SensorModel.tag()).is_array);
        assert!(legacy_core(SensorProperty::StoreSettingsInFlash.tag()).is_executable);
        assert!(!legacy_core(42).is_known());
    }

    #[test]
    fn test_second_gyro_flags() {
        let tag = ImuProperty::OutputRawGyr1.tag();
        assert!(!ig1_imu(tag, false).is_known());
        assert_eq!(ig1_imu(tag, true).ty, PropertyType::Bool);
        assert!(!legacy_imu(tag).is_known());
    }

    #[test]
    fn test_calibration_rules_shared_by_both_generations() {
        for property in [
            ImuProperty::AccAlignment,
            ImuProperty::AccBias,
            ImuProperty::GyrAlignment,
            ImuProperty::GyrBias,
            ImuProperty::MagAlignment,
            ImuProperty::MagBias,
            ImuProperty::MagReference,
            ImuProperty::MagHardIronOffset,
            ImuProperty::MagSoftIronMatrix,
        ] {
            assert_eq!(legacy_imu(property.tag()), PropertyRule::array(Float), "{property:?}");
            assert_eq!(ig1_imu(property.tag(), false), PropertyRule::array(Float), "{property:?}");
        }
        for property in [
            ImuProperty::CentricCompensationRate,
            ImuProperty::LinearCompensationRate,
            ImuProperty::FieldRadius,
        ] {
            assert_eq!(ig1_imu(property.tag(), true), PropertyRule::new(Float));
            assert_eq!(legacy_imu(property.tag()), PropertyRule::new(Float));
        }
        assert_eq!(ig1_imu(ImuProperty::FilterPreset.tag(), true), PropertyRule::new(Int32));
        assert!(!ig1_imu(ImuProperty::OutputLowPrecision.tag(), true).is_known());
    }

    #[test]
    fn test_gnss_rules() {
        assert_eq!(gnss(GnssProperty::OutputNavPvtHeadVeh.tag()).ty, PropertyType::Bool);
        assert!(!gnss(ImuProperty::UartFormat.tag() + 100).is_known());
    }

    #[test]
    fn test_filter_modes_json() {
        let parsed: serde_json::Value = serde_json::from_slice(&supported_filter_modes()).unwrap();
        let config = parsed["config"].as_array().unwrap();
        assert_eq!(config.len(), 5);
        assert_eq!(config[3]["key"], "Madgwick gyroscope & accelerometer filter");
        assert_eq!(config[4]["value"], 4);
    }
}
