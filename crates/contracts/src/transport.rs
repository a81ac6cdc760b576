//! Transport / IoSystem traits - byte channel abstraction
//!
//! Concrete drivers (serial, CAN, Bluetooth, network) live outside the core.
//! The sensor stack only talks to these two traits, so real devices and the
//! simulated device used in tests share one API.

use std::sync::Arc;

use crate::{Event, SensorDesc, SensorInitError, ZenResult};

/// Inbound byte callback.
///
/// Invoked on the transport's own ingestion thread. A transport must let one
/// invocation run to completion before delivering the next chunk.
pub type BytesCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Inbound pre-parsed event callback (event-based transports only).
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Connection-loss callback.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Bidirectional byte channel to one device.
///
/// # Design Principles
///
/// 1. **Push delivery**: received bytes are pushed to a single subscriber
/// 2. **Blocking send**: `send` returns once the bytes are handed to the driver
/// 3. **Identity**: `equals` decides whether a discovery entry addresses this channel
///
/// # Example
///
/// ```ignore
/// let transport: Arc<dyn Transport> = io_system.obtain(&desc)?;
/// transport.subscribe(Arc::new(|bytes| println!("{} bytes", bytes.len())));
/// transport.send(&[0x3A, 0x01])?;
/// transport.close();
/// ```
pub trait Transport: Send + Sync {
    /// Io type name, e.g. "Serial" or "Test"
    fn io_type(&self) -> &str;

    /// Send raw bytes to the device
    fn send(&self, data: &[u8]) -> ZenResult<()>;

    fn baud_rate(&self) -> ZenResult<u32>;

    fn set_baud_rate(&self, rate: u32) -> ZenResult<()>;

    fn supported_baud_rates(&self) -> ZenResult<Vec<u32>>;

    /// Whether `desc` addresses this channel
    fn equals(&self, desc: &SensorDesc) -> bool;

    /// Register the inbound byte subscriber, replacing any previous one
    fn subscribe(&self, callback: BytesCallback);

    /// Remove the inbound subscriber
    fn unsubscribe(&self);

    /// Stop delivering data; idempotent
    fn close(&self);

    /// Register a callback fired once when the device disappears
    fn on_disconnect(&self, _callback: DisconnectCallback) {}

    /// Event-based transports deliver pre-parsed events instead of bytes.
    /// Returns `false` when the transport does not support this mode.
    fn subscribe_events(&self, _callback: EventCallback) -> bool {
        false
    }
}

/// A family of transports that can be enumerated and opened.
pub trait IoSystem: Send + Sync {
    fn io_type(&self) -> &str;

    /// Whether the driver backing this system is usable on this host
    fn available(&self) -> bool {
        true
    }

    /// Enumerate reachable devices
    fn list_devices(&self) -> ZenResult<Vec<SensorDesc>>;

    /// Open the device described by `desc`
    fn obtain(&self, desc: &SensorDesc) -> Result<Arc<dyn Transport>, SensorInitError>;

    /// Baud rate to use when the caller does not ask for one
    fn default_baud_rate(&self) -> u32;

    /// Pull-driven systems (CAN) need periodic polling
    fn pollable(&self) -> bool {
        false
    }

    fn poll(&self) -> ZenResult<()> {
        Ok(())
    }
}
