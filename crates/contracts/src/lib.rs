//! # Contracts
//!
//! Shared interface contracts of the sensor stack: wire frames, sensor and
//! component descriptions, property metadata, measurement samples, events,
//! the error taxonomy and the transport SPI.
//! All other crates depend on this crate; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Sample timestamps are device time in seconds (f64)
//! - Ordering is only guaranteed per sensor

mod config;
mod error;
mod event;
mod frame;
mod property;
mod sample;
mod sensor_config;
mod sensor_desc;
mod sink;
mod transport;

pub use config::*;
pub use error::*;
pub use event::*;
pub use frame::*;
pub use property::*;
pub use sample::*;
pub use sensor_config::*;
pub use sensor_desc::*;
pub use sink::*;
pub use transport::{BytesCallback, DisconnectCallback, EventCallback, IoSystem, Transport};
