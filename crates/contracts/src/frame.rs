//! Frame - the unit of protocol exchange

use bytes::Bytes;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Decoded wire frame.
///
/// Built by a codec, consumed by exactly one frame subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Component address (0 = sensor itself)
    pub address: u8,
    /// Function code (opcode)
    pub function: u8,
    /// Payload bytes
    pub payload: Bytes,
}

impl Frame {
    pub fn new(address: u8, function: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            address,
            function,
            payload: payload.into(),
        }
    }

    /// Frame without payload (acks, mode switches, getters).
    pub fn empty(address: u8, function: u8) -> Self {
        Self::new(address, function, Bytes::new())
    }
}
