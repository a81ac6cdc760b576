//! # Sensor Core
//!
//! 传感器核心：把协商好的链路变成带属性、带组件的传感器。
//!
//! 负责：
//! - 按协议代分发入站帧 (ack / 属性回复 / 采样)
//! - 属性对象 (规则表驱动，配置读写自动退出数据流模式)
//! - IMU / GNSS 组件及其采样解析
//! - 固件 / IAP 上传
//!
//! ## Usage Example
//!
//! ```ignore
//! use sensor_core::Sensor;
//!
//! let negotiated = ConnectionNegotiator::new(communicator.clone()).negotiate(921_600)?;
//! let sensor = Sensor::create(token, desc, negotiated.config, communicator, DEFAULT_IO_TIMEOUT)?;
//!
//! sensor.subscribe(queue.clone());
//! for (index, component) in sensor.components(Some("imu")) {
//!     component.properties().set_bool(ImuProperty::OutputQuat.tag(), true)?;
//! }
//! ```

pub mod component;
pub mod components;
pub mod factory;
pub mod parsing;
pub mod properties;
mod sensor;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use component::SensorComponent;
pub use factory::{make_component, ComponentFactory};
pub use properties::{PropertyChangeCallback, Properties};
pub use sensor::{ReleaseCallback, Sensor};
pub use upload::{UploadKind, PAGE_LEN};
