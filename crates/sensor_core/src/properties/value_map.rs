//! Discrete value maps
//!
//! Integer properties that only accept a fixed set of values. Writes round
//! up to the nearest supported value; the device may store either the value
//! itself or its index in a code table.

use contracts::{ZenError, ZenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueMap {
    values: &'static [i32],
    /// Wire code per value; `None` sends the value itself
    codes: Option<&'static [u32]>,
}

impl ValueMap {
    pub const fn identity(values: &'static [i32]) -> Self {
        Self { values, codes: None }
    }

    pub const fn coded(values: &'static [i32], codes: &'static [u32]) -> Self {
        Self {
            values,
            codes: Some(codes),
        }
    }

    /// Supported values, ascending.
    pub fn supported(&self) -> &'static [i32] {
        self.values
    }

    /// Smallest supported value `>= value`, or the largest one.
    pub fn round_up(&self, value: i32) -> i32 {
        self.values
            .iter()
            .copied()
            .find(|supported| *supported >= value)
            .or_else(|| self.values.last().copied())
            .unwrap_or(value)
    }

    /// Value as sent to the device.
    pub fn encode(&self, value: i32) -> u32 {
        let rounded = self.round_up(value);
        match self.codes {
            Some(codes) => self
                .values
                .iter()
                .position(|supported| *supported == rounded)
                .and_then(|index| codes.get(index).copied())
                .unwrap_or(0),
            None => rounded as u32,
        }
    }

    /// Value as reported by the device.
    pub fn decode(&self, wire: u32) -> ZenResult<i32> {
        match self.codes {
            Some(codes) => codes
                .iter()
                .position(|code| *code == wire)
                .and_then(|index| self.values.get(index).copied())
                .ok_or(ZenError::IoMsgCorrupt),
            None => Ok(wire as i32),
        }
    }
}

pub const SAMPLING_RATES: ValueMap = ValueMap::identity(&[5, 10, 25, 50, 100, 200, 400]);
pub const ACC_RANGES: ValueMap = ValueMap::identity(&[2, 4, 8, 16]);
pub const GYR_RANGES: ValueMap = ValueMap::identity(&[125, 245, 500, 1000, 2000]);
pub const MAG_RANGES: ValueMap = ValueMap::identity(&[4, 8, 12, 16]);

/// kbit/s, legacy firmware stores the table index
pub const LEGACY_CAN_BAUD_RATES: ValueMap = ValueMap::coded(&[125, 250, 500, 1000], &[0, 1, 2, 3]);
/// seconds
pub const LEGACY_CAN_HEARTBEATS: ValueMap = ValueMap::coded(&[1, 2, 5, 10], &[1, 2, 3, 4]);
pub const LEGACY_UART_BAUD_RATES: ValueMap =
    ValueMap::identity(&[19_200, 38_400, 57_600, 115_200, 230_400, 256_000, 460_800, 921_600]);

/// kbit/s
pub const IG1_CAN_BAUD_RATES: ValueMap = ValueMap::identity(&[125, 250, 500, 800, 1000]);
/// seconds
pub const IG1_CAN_HEARTBEATS: ValueMap = ValueMap::identity(&[1, 2, 5, 10]);
pub const IG1_UART_BAUD_RATES: ValueMap = ValueMap::coded(
    &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 256_000, 460_800, 921_600],
    &[0, 1, 2, 3, 4, 5, 6, 7, 8],
);
