//! Event - sensor output delivered to subscriber queues

use serde::{Deserialize, Serialize};

use crate::{GnssSample, ImuSample, SensorDesc};

/// Opaque handle of a live sensor. Unique and monotonically assigned.
pub type SensorToken = u64;

/// Why a sensor stopped producing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Released by its last subscriber
    Released,
    /// Transport reported the device is gone
    ConnectionLost,
    /// Manager shut down
    Shutdown,
}

impl DisconnectReason {
    /// Numeric subcode carried in the disconnect event.
    pub fn code(self) -> u32 {
        match self {
            Self::Released => 0,
            Self::ConnectionLost => 1,
            Self::Shutdown => 2,
        }
    }
}

/// Progress of an asynchronous sensor listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListingProgress {
    /// 0.0 ..= 1.0
    pub progress: f32,
    pub complete: bool,
}

/// Discriminant of [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Imu,
    Gnss,
    SensorDisconnected,
    SensorFound,
    SensorListingProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Imu(ImuSample),
    Gnss(GnssSample),
    SensorDisconnected(DisconnectReason),
    SensorFound(SensorDesc),
    SensorListingProgress(ListingProgress),
}

/// Immutable event, cloned onto every subscriber queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Emitting sensor (0 for listing events)
    pub sensor: SensorToken,
    /// Index of the emitting component (0 for sensor-wide events)
    pub component: u64,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(sensor: SensorToken, component: u64, payload: EventPayload) -> Self {
        Self {
            sensor,
            component,
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::Imu(_) => EventType::Imu,
            EventPayload::Gnss(_) => EventType::Gnss,
            EventPayload::SensorDisconnected(_) => EventType::SensorDisconnected,
            EventPayload::SensorFound(_) => EventType::SensorFound,
            EventPayload::SensorListingProgress(_) => EventType::SensorListingProgress,
        }
    }

    /// Whether this is the last event a sensor will ever emit.
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, EventPayload::SensorDisconnected(_))
    }
}
