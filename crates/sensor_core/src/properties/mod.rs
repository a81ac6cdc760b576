//! Properties
//!
//! One properties object per sensor (core) and per component. Every object
//! answers the four metadata predicates from its rulebook and implements the
//! typed accessors it supports; everything else falls through to the trait
//! defaults, which reject the tag.

mod channel;
mod ig1_core;
mod ig1_gnss;
mod ig1_imu;
mod legacy_core;
mod legacy_imu;
mod notifier;
pub mod rules;
mod stream;
pub mod value_map;

use contracts::{PropertyRule, PropertyTag, PropertyType, PropertyValue, ZenError, ZenResult};

pub use channel::DeviceChannel;
pub use ig1_core::Ig1CoreProperties;
pub use ig1_gnss::{gnss_bit, Ig1GnssProperties, RTK_CHUNK_LEN};
pub use ig1_imu::{ig1_imu_bit, Ig1ImuProperties};
pub use legacy_core::LegacyCoreProperties;
pub use legacy_imu::{legacy_imu_bit, Calibration, LegacyImuProperties};
pub use notifier::{ChangeNotifier, PropertyChangeCallback};
pub use stream::{StreamControl, StreamGuard};

/// Typed access to the properties of a sensor or component.
pub trait Properties: Send + Sync {
    fn rule(&self, tag: PropertyTag) -> PropertyRule;

    fn notifier(&self) -> &ChangeNotifier;

    fn execute(&self, tag: PropertyTag) -> ZenResult<()> {
        self.check_command(tag)?;
        Err(ZenError::UnknownProperty)
    }

    /// Read an array property. `ty` is the element type the caller expects.
    fn get_array(&self, tag: PropertyTag, ty: PropertyType) -> ZenResult<PropertyValue> {
        self.check_read(tag, ty, true)?;
        Err(ZenError::UnknownProperty)
    }

    fn get_bool(&self, tag: PropertyTag) -> ZenResult<bool> {
        self.check_read(tag, PropertyType::Bool, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn get_float(&self, tag: PropertyTag) -> ZenResult<f32> {
        self.check_read(tag, PropertyType::Float, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn get_int32(&self, tag: PropertyTag) -> ZenResult<i32> {
        self.check_read(tag, PropertyType::Int32, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn get_uint64(&self, tag: PropertyTag) -> ZenResult<u64> {
        self.check_read(tag, PropertyType::UInt64, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn set_array(&self, tag: PropertyTag, value: &PropertyValue) -> ZenResult<()> {
        self.check_write(tag, value.property_type(), true)?;
        Err(ZenError::UnknownProperty)
    }

    fn set_bool(&self, tag: PropertyTag, _value: bool) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Bool, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn set_float(&self, tag: PropertyTag, _value: f32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Float, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn set_int32(&self, tag: PropertyTag, _value: i32) -> ZenResult<()> {
        self.check_write(tag, PropertyType::Int32, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn set_uint64(&self, tag: PropertyTag, _value: u64) -> ZenResult<()> {
        self.check_write(tag, PropertyType::UInt64, false)?;
        Err(ZenError::UnknownProperty)
    }

    fn is_array(&self, tag: PropertyTag) -> bool {
        self.rule(tag).is_array
    }

    fn is_constant(&self, tag: PropertyTag) -> bool {
        self.rule(tag).is_constant
    }

    fn is_executable(&self, tag: PropertyTag) -> bool {
        self.rule(tag).is_executable
    }

    fn property_type(&self, tag: PropertyTag) -> PropertyType {
        self.rule(tag).ty
    }

    fn subscribe_to_property_changes(&self, callback: PropertyChangeCallback) {
        self.notifier().subscribe(callback);
    }

    /// Rule of `tag` if it is a known, readable value of the given shape.
    fn check_read(&self, tag: PropertyTag, ty: PropertyType, array: bool) -> ZenResult<PropertyRule> {
        let rule = self.rule(tag);
        if !rule.is_known() {
            return Err(ZenError::UnknownProperty);
        }
        if rule.is_executable || rule.ty != ty || rule.is_array != array {
            return Err(ZenError::WrongDataType);
        }
        Ok(rule)
    }

    /// Like [`Properties::check_read`], and rejects constants.
    fn check_write(&self, tag: PropertyTag, ty: PropertyType, array: bool) -> ZenResult<PropertyRule> {
        let rule = self.check_read(tag, ty, array)?;
        if rule.is_constant {
            return Err(ZenError::NotSupported);
        }
        Ok(rule)
    }

    fn check_command(&self, tag: PropertyTag) -> ZenResult<()> {
        let rule = self.rule(tag);
        if !rule.is_known() {
            return Err(ZenError::UnknownProperty);
        }
        if !rule.is_executable {
            return Err(ZenError::NotSupported);
        }
        Ok(())
    }
}

/// Knows no tag at all. Used by sensors fed by an event transport.
#[derive(Debug, Default)]
pub struct NoProperties {
    notifier: ChangeNotifier,
}

impl Properties for NoProperties {
    fn rule(&self, tag: PropertyTag) -> PropertyRule {
        rules::none(tag)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

/// Convert a typed array value into its wire bytes.
pub(crate) fn array_bytes(value: &PropertyValue) -> ZenResult<Vec<u8>> {
    match value {
        PropertyValue::Bytes(bytes) => Ok(bytes.clone()),
        PropertyValue::Int32Array(values) => Ok(bytemuck::cast_slice(values).to_vec()),
        PropertyValue::FloatArray(values) => Ok(bytemuck::cast_slice(values).to_vec()),
        _ => Err(ZenError::WrongDataType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorProperty;

    struct LegacyRulesOnly(ChangeNotifier);

    impl Properties for LegacyRulesOnly {
        fn rule(&self, tag: PropertyTag) -> PropertyRule {
            rules::legacy_core(tag)
        }

        fn notifier(&self) -> &ChangeNotifier {
            &self.0
        }
    }

    #[test]
    fn test_default_checks() {
        let properties = LegacyRulesOnly(ChangeNotifier::new());
        let level = SensorProperty::BatteryLevel.tag();

        assert_eq!(properties.get_int32(level), Err(ZenError::WrongDataType));
        assert_eq!(properties.set_float(level, 1.0), Err(ZenError::NotSupported));
        assert_eq!(properties.execute(level), Err(ZenError::NotSupported));
        assert_eq!(properties.get_bool(7), Err(ZenError::UnknownProperty));
        assert_eq!(
            properties.get_float(SensorProperty::StoreSettingsInFlash.tag()),
            Err(ZenError::WrongDataType)
        );
        assert!(properties.is_constant(level));
        assert_eq!(properties.property_type(level), PropertyType::Float);
    }

    #[test]
    fn test_no_properties() {
        let properties = NoProperties::default();
        assert_eq!(properties.get_bool(1000), Err(ZenError::UnknownProperty));
        assert!(!properties.is_array(1000));
    }

    #[test]
    fn test_array_bytes() {
        assert_eq!(
            array_bytes(&PropertyValue::Int32Array(vec![1, 2])).unwrap(),
            vec![1, 0, 0, 0, 2, 0, 0, 0]
        );
        assert_eq!(array_bytes(&PropertyValue::Bool(true)), Err(ZenError::WrongDataType));
    }
}
