//! SensorConfig - negotiated sensor description

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Component id of an inertial measurement unit.
pub const COMPONENT_IMU: &str = "imu";
/// Component id of a satellite receiver.
pub const COMPONENT_GNSS: &str = "gnss";

bitflags! {
    /// Per-component hardware quirks discovered during negotiation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SpecialOptions: u32 {
        /// Device carries a second gyroscope (Ig1 family).
        const SECOND_GYRO = 1 << 0;
        /// GNSS receiver accepts RTK correction streams.
        const RTK_CORRECTION = 1 << 1;
    }
}

/// One logical measurement component on a physical sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// "imu" or "gnss"
    pub id: String,
    /// Component protocol version
    pub version: u32,
    #[serde(default)]
    pub special_options: SpecialOptions,
}

impl ComponentConfig {
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
            special_options: SpecialOptions::empty(),
        }
    }

    pub fn with_options(mut self, options: SpecialOptions) -> Self {
        self.special_options = options;
        self
    }
}

/// Negotiated description of a sensor.
///
/// Version 0 is the legacy generation with an implicit single IMU;
/// version 1 is the Ig1 generation with an explicit component list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub version: u32,
    pub components: Vec<ComponentConfig>,
}

impl SensorConfig {
    /// Configuration of every legacy sensor.
    pub fn legacy() -> Self {
        Self {
            version: 0,
            components: vec![ComponentConfig::new(COMPONENT_IMU, 0)],
        }
    }
}
