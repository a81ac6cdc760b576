//! # OpenZen
//!
//! 面向应用的入口：传感器管理器与客户端。
//!
//! - `SensorManager`: 进程级单例，持有全部传感器，运行发现线程和轮询线程
//! - `Client`: 每个客户端一个事件队列，通过句柄访问传感器、组件和属性
//! - `IoRegistry`: 可用的 IO 系统 (模拟设备系统始终存在)
//!
//! ## Usage Example
//!
//! ```ignore
//! use openzen::{make_client, ImuProperty};
//!
//! let client = make_client();
//! client.list_sensors_async()?;
//! let sensor = client.obtain_sensor_by_name("Test", "sim", 0)?;
//!
//! let imu = client.components(sensor, Some("imu"))?[0];
//! client.set_bool(sensor, Some(imu), ImuProperty::OutputQuat.tag(), true)?;
//!
//! while let Some(event) = client.wait_for_next_event() {
//!     println!("{:?}", event.payload);
//! }
//! ```

mod client;
pub mod io;
mod manager;

pub use client::{make_client, Client, ComponentHandle, SensorHandle};
pub use contracts::{
    AsyncStatus, DisconnectReason, Event, EventPayload, EventType, GnssProperty, ImuProperty,
    PropertyType, PropertyValue, SensorDesc, SensorInitError, SensorProperty, ZenConfig, ZenError,
    ZenResult,
};
pub use io::IoRegistry;
pub use manager::SensorManager;
