//! 组件工厂注册表
//!
//! 进程级、按组件 id 索引，首次使用时初始化。

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use contracts::{ComponentConfig, SensorInitError, SpecialOptions, COMPONENT_GNSS, COMPONENT_IMU};
use tracing::debug;

use crate::component::SensorComponent;
use crate::components::{GnssComponent, Ig1ImuComponent, LegacyImuComponent};
use crate::properties::{DeviceChannel, Ig1GnssProperties, Ig1ImuProperties, LegacyImuProperties};

/// Builds one kind of component for a negotiated protocol generation.
pub trait ComponentFactory: Send + Sync {
    fn make_component(
        &self,
        config: &ComponentConfig,
        generation: u32,
        channel: DeviceChannel,
    ) -> Result<Arc<dyn SensorComponent>, SensorInitError>;
}

struct ImuFactory;

impl ComponentFactory for ImuFactory {
    fn make_component(
        &self,
        config: &ComponentConfig,
        generation: u32,
        channel: DeviceChannel,
    ) -> Result<Arc<dyn SensorComponent>, SensorInitError> {
        match generation {
            0 => {
                let properties = Arc::new(LegacyImuProperties::new(channel));
                Ok(Arc::new(LegacyImuComponent::new(properties)))
            }
            1 => {
                let second_gyro = config.special_options.contains(SpecialOptions::SECOND_GYRO);
                let properties = Arc::new(Ig1ImuProperties::new(channel, second_gyro));
                Ok(Arc::new(Ig1ImuComponent::new(properties)))
            }
            _ => Err(SensorInitError::UnsupportedProtocol),
        }
    }
}

struct GnssFactory;

impl ComponentFactory for GnssFactory {
    fn make_component(
        &self,
        config: &ComponentConfig,
        generation: u32,
        channel: DeviceChannel,
    ) -> Result<Arc<dyn SensorComponent>, SensorInitError> {
        if generation != 1 {
            return Err(SensorInitError::UnsupportedProtocol);
        }
        let rtk = config.special_options.contains(SpecialOptions::RTK_CORRECTION);
        let properties = Arc::new(Ig1GnssProperties::new(channel, rtk));
        Ok(Arc::new(GnssComponent::new(properties)))
    }
}

type Registry = HashMap<&'static str, Box<dyn ComponentFactory>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry: Registry = HashMap::new();
        registry.insert(COMPONENT_IMU, Box::new(ImuFactory));
        registry.insert(COMPONENT_GNSS, Box::new(GnssFactory));
        debug!(factories = registry.len(), "component factories registered");
        registry
    })
}

pub fn factory(id: &str) -> Option<&'static dyn ComponentFactory> {
    registry().get(id).map(Box::as_ref)
}

/// Build the component described by `config`.
pub fn make_component(
    config: &ComponentConfig,
    generation: u32,
    channel: DeviceChannel,
) -> Result<Arc<dyn SensorComponent>, SensorInitError> {
    factory(&config.id)
        .ok_or(SensorInitError::UnsupportedComponent)?
        .make_component(config, generation, channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ig1_rig;
    use contracts::ImuProperty;

    #[test]
    fn test_unknown_component() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let channel = DeviceChannel::new(rig.stream.clone());
        let error = make_component(&ComponentConfig::new("lidar", 1), 1, channel).unwrap_err();
        assert_eq!(error, SensorInitError::UnsupportedComponent);
    }

    #[test]
    fn test_generation_selects_implementation() {
        let rig = ig1_rig("LPMS-IG1-RS232");
        let channel = DeviceChannel::new(rig.stream.clone());

        let ig1 = ComponentConfig::new(COMPONENT_IMU, 1).with_options(SpecialOptions::SECOND_GYRO);
        let component = make_component(&ig1, 1, channel.clone()).unwrap();
        assert_eq!(component.kind(), COMPONENT_IMU);
        assert!(component.properties().is_array(ImuProperty::SupportedFilterModes.tag()));
        assert_eq!(
            component.properties().property_type(ImuProperty::OutputRawGyr1.tag()),
            contracts::PropertyType::Bool
        );

        let legacy = make_component(&ComponentConfig::new(COMPONENT_IMU, 0), 0, channel.clone()).unwrap();
        assert_eq!(legacy.sample_function(), 9);

        assert_eq!(
            make_component(&ComponentConfig::new(COMPONENT_GNSS, 1), 0, channel).unwrap_err(),
            SensorInitError::UnsupportedProtocol
        );
    }
}
