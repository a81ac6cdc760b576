//! SensorDesc - discovery address-book entry

use serde::{Deserialize, Serialize};

/// Capacity of the fixed-size C strings, including the NUL terminator.
pub const NAME_CAPACITY: usize = 256;
pub const SERIAL_CAPACITY: usize = 64;
pub const IO_TYPE_CAPACITY: usize = 64;
pub const IDENTIFIER_CAPACITY: usize = 64;

/// Sensor description produced by discovery.
///
/// Two descriptions refer to the same device when `io_type`, `identifier` and
/// `serial_number` agree; name and baud rate are informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorDesc {
    pub name: String,
    pub serial_number: String,
    pub io_type: String,
    pub identifier: String,
    pub baud_rate: u32,
}

impl SensorDesc {
    /// Build a description, truncating each string to its wire capacity.
    pub fn new(
        name: &str,
        serial_number: &str,
        io_type: &str,
        identifier: &str,
        baud_rate: u32,
    ) -> Self {
        Self {
            name: truncate(name, NAME_CAPACITY),
            serial_number: truncate(serial_number, SERIAL_CAPACITY),
            io_type: truncate(io_type, IO_TYPE_CAPACITY),
            identifier: truncate(identifier, IDENTIFIER_CAPACITY),
            baud_rate,
        }
    }

    /// Whether this description addresses the given device.
    pub fn matches(&self, io_type: &str, identifier: &str, serial_number: &str) -> bool {
        self.io_type == io_type && self.identifier == identifier && self.serial_number == serial_number
    }
}

impl PartialEq for SensorDesc {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.io_type, &other.identifier, &other.serial_number)
    }
}

impl Eq for SensorDesc {}

/// Keep at most `capacity - 1` bytes, cutting on a char boundary.
fn truncate(value: &str, capacity: usize) -> String {
    let max = capacity - 1;
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
