//! Property tags, metadata and values
//!
//! A property is addressed by an opaque integer tag. Sensor-wide tags and
//! per-component tags live in separate enumerations that all start at 1000;
//! `0` is reserved as the invalid tag.

use serde::{Deserialize, Serialize};

use crate::ZenError;

/// Opaque property tag as exchanged with clients.
pub type PropertyTag = u32;

/// Reserved tag, used when an acknowledgement is not bound to a property.
pub const PROPERTY_INVALID: PropertyTag = 0;

/// Element type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Invalid,
    Byte,
    Bool,
    Float,
    Int32,
    UInt64,
}

/// Metadata the properties object answers for every known tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRule {
    pub is_array: bool,
    pub is_constant: bool,
    pub is_executable: bool,
    pub ty: PropertyType,
}

impl PropertyRule {
    /// Rule of a tag the rulebook does not know.
    pub const UNKNOWN: Self = Self::new(PropertyType::Invalid);

    /// Plain read/write scalar.
    pub const fn new(ty: PropertyType) -> Self {
        Self {
            is_array: false,
            is_constant: false,
            is_executable: false,
            ty,
        }
    }

    /// Read/write array.
    pub const fn array(ty: PropertyType) -> Self {
        Self {
            is_array: true,
            ..Self::new(ty)
        }
    }

    /// Read-only array.
    pub const fn constant_array(ty: PropertyType) -> Self {
        Self {
            is_array: true,
            is_constant: true,
            ..Self::new(ty)
        }
    }

    /// Read-only scalar.
    pub const fn constant(ty: PropertyType) -> Self {
        Self {
            is_constant: true,
            ..Self::new(ty)
        }
    }

    /// Command without a value.
    pub const fn command() -> Self {
        Self {
            is_executable: true,
            ..Self::new(PropertyType::Invalid)
        }
    }

    pub fn is_known(&self) -> bool {
        self.ty != PropertyType::Invalid || self.is_executable
    }
}

/// Value carried to property-change subscribers and returned by array reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Byte(u8),
    Int32(i32),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Int32Array(Vec<i32>),
    FloatArray(Vec<f32>),
}

impl PropertyValue {
    /// Element type of the value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Bool(_) => PropertyType::Bool,
            Self::Byte(_) | Self::Bytes(_) => PropertyType::Byte,
            Self::Int32(_) | Self::UInt32(_) | Self::Int32Array(_) => PropertyType::Int32,
            Self::UInt64(_) => PropertyType::UInt64,
            Self::Float(_) | Self::FloatArray(_) => PropertyType::Float,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_int32_array(&self) -> Option<&[i32]> {
        match self {
            Self::Int32Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f32]> {
        match self {
            Self::FloatArray(values) => Some(values),
            _ => None,
        }
    }
}

/// Declares a tag enumeration numbered consecutively from its first variant.
macro_rules! property_tags {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $first:ident = $start:literal,
            $( $variant:ident, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum $name {
            $first = $start,
            $( $variant, )*
        }

        impl $name {
            /// Every tag of this enumeration, in declaration order.
            pub const ALL: &'static [Self] = &[Self::$first, $( Self::$variant, )*];

            pub const fn tag(self) -> PropertyTag {
                self as PropertyTag
            }
        }

        impl From<$name> for PropertyTag {
            fn from(value: $name) -> Self {
                value.tag()
            }
        }

        impl TryFrom<PropertyTag> for $name {
            type Error = ZenError;

            fn try_from(tag: PropertyTag) -> Result<Self, Self::Error> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.tag() == tag)
                    .ok_or(ZenError::UnknownProperty)
            }
        }
    };
}

property_tags! {
    /// Sensor-wide properties.
    pub enum SensorProperty {
        DeviceName = 1000,
        FirmwareInfo,
        FirmwareVersion,
        RestoreFactorySettings,
        SerialNumber,
        StoreSettingsInFlash,
        BatteryCharging,
        BatteryLevel,
        BatteryVoltage,
        BaudRate,
        SupportedBaudRates,
        DataMode,
        TimeOffset,
        SensorModel,
    }
}

property_tags! {
    /// Properties of an IMU component.
    pub enum ImuProperty {
        StreamData = 1000,
        SamplingRate,
        SupportedSamplingRates,
        PollSensorData,
        CalibrateGyro,
        ResetOrientationOffset,
        CentricCompensationRate,
        LinearCompensationRate,
        FieldRadius,
        FilterMode,
        SupportedFilterModes,
        FilterPreset,
        OrientationOffsetMode,
        AccAlignment,
        AccBias,
        AccRange,
        AccSupportedRanges,
        GyrAlignment,
        GyrBias,
        GyrRange,
        GyrSupportedRanges,
        GyrUseAutoCalibration,
        GyrUseThreshold,
        MagAlignment,
        MagBias,
        MagRange,
        MagSupportedRanges,
        MagReference,
        MagHardIronOffset,
        MagSoftIronMatrix,
        OutputLowPrecision,
        OutputRawAcc,
        OutputRawGyr,
        OutputRawMag,
        OutputEuler,
        OutputQuat,
        OutputAngularVel,
        OutputLinearAcc,
        OutputHeaveMotion,
        OutputAltitude,
        OutputPressure,
        OutputTemperature,
        DegRadOutput,
        OutputAccCalibrated,
        OutputRawGyr0,
        OutputRawGyr1,
        OutputGyr0BiasCalib,
        OutputGyr1BiasCalib,
        OutputGyr0AlignCalib,
        OutputGyr1AlignCalib,
        OutputMagCalib,
        CanStartId,
        CanBaudRate,
        CanDataPrecision,
        CanHeartbeat,
        UartBaudRate,
        UartFormat,
    }
}

property_tags! {
    /// Properties of a GNSS component. Output flags follow the u-blox message layout.
    pub enum GnssProperty {
        StreamData = 1000,
        OutputNavPvtITow,
        OutputNavPvtYear,
        OutputNavPvtMonth,
        OutputNavPvtDay,
        OutputNavPvtHour,
        OutputNavPvtMinute,
        OutputNavPvtSecond,
        OutputNavPvtValid,
        OutputNavPvtTAcc,
        OutputNavPvtNano,
        OutputNavPvtFixType,
        OutputNavPvtFlags,
        OutputNavPvtFlags2,
        OutputNavPvtNumSv,
        OutputNavPvtLongitude,
        OutputNavPvtLatitude,
        OutputNavPvtHeight,
        OutputNavPvtHMsl,
        OutputNavPvtHAcc,
        OutputNavPvtVAcc,
        OutputNavPvtVelN,
        OutputNavPvtVelE,
        OutputNavPvtVelD,
        OutputNavPvtGSpeed,
        OutputNavPvtHeadMot,
        OutputNavPvtSAcc,
        OutputNavPvtHeadAcc,
        OutputNavPvtPDop,
        OutputNavPvtHeadVeh,
        OutputNavAttITow,
        OutputNavAttVersion,
        OutputNavAttRoll,
        OutputNavAttPitch,
        OutputNavAttHeading,
        OutputNavAttAccRoll,
        OutputNavAttAccPitch,
        OutputNavAttAccHeading,
        OutputEsfStatusITow,
        OutputEsfStatusVersion,
        OutputEsfStatusInitStatus1,
        OutputEsfStatusInitStatus2,
        OutputEsfStatusFusionMode,
        OutputEsfStatusNumSens,
        OutputEsfStatusSensStatus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_consecutive() {
        assert_eq!(SensorProperty::DeviceName.tag(), 1000);
        assert_eq!(SensorProperty::SensorModel.tag(), 1013);
        assert_eq!(ImuProperty::StreamData.tag(), 1000);
        assert_eq!(ImuProperty::try_from(1037), Ok(ImuProperty::OutputLinearAcc));
        assert_eq!(GnssProperty::try_from(5), Err(ZenError::UnknownProperty));
    }

    #[test]
    fn test_rule_constructors() {
        let rule = PropertyRule::constant_array(PropertyType::Int32);
        assert!(rule.is_array && rule.is_constant && !rule.is_executable);
        assert!(PropertyRule::command().is_known());
        assert!(!PropertyRule::UNKNOWN.is_known());
    }

    #[test]
    fn test_value_type() {
        assert_eq!(PropertyValue::Bytes(vec![1]).property_type(), PropertyType::Byte);
        assert_eq!(PropertyValue::FloatArray(vec![]).property_type(), PropertyType::Float);
    }
}
