//! ZenSync binary framing
//!
//! `0x3A | addr | pad | fn | pad | len_lo | len_hi | payload | chk_lo | chk_hi | 0x0D | 0x0A`

use bytes::Bytes;
use contracts::Frame;

use super::{FrameParser, ParseStatus};
use crate::error::{ParseError, Result};

const START: u8 = 0x3A;
const END1: u8 = 0x0D;
const END2: u8 = 0x0A;

/// Checksum over address, function, low length byte and payload.
fn checksum(address: u8, function: u8, length: u16, payload: &[u8]) -> u16 {
    payload.iter().fold(
        u16::from(address)
            .wrapping_add(u16::from(function))
            .wrapping_add(length & 0xFF),
        |sum, byte| sum.wrapping_add(u16::from(*byte)),
    )
}

pub(super) fn encode(address: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u16;
    let chk = checksum(address, function, length, payload);

    let mut out = Vec::with_capacity(payload.len() + 11);
    out.extend_from_slice(&[START, address, 0, function, 0]);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&chk.to_le_bytes());
    out.extend_from_slice(&[END1, END2]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Addr1,
    Addr2,
    Fn1,
    Fn2,
    Len1,
    Len2,
    Data,
    Chk1,
    Chk2,
    End1,
    End2,
    Finished,
}

/// Byte-at-a-time ZenSync parser.
pub struct ZenSyncParser {
    state: State,
    raw: Vec<u8>,
    address: u8,
    function: u8,
    length: u16,
    payload: Vec<u8>,
    chk_lo: u8,
}

impl ZenSyncParser {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            raw: Vec::new(),
            address: 0,
            function: 0,
            length: 0,
            payload: Vec::new(),
            chk_lo: 0,
        }
    }

    fn step(&mut self, byte: u8) -> Result<()> {
        self.state = match self.state {
            State::Start if byte == START => State::Addr1,
            State::Start => return Err(ParseError::ExpectedStart),
            State::Addr1 => {
                self.address = byte;
                State::Addr2
            }
            // padding bytes are reserved, not validated
            State::Addr2 => State::Fn1,
            State::Fn1 => {
                self.function = byte;
                State::Fn2
            }
            State::Fn2 => State::Len1,
            State::Len1 => {
                self.length = u16::from(byte);
                State::Len2
            }
            State::Len2 => {
                self.length |= u16::from(byte) << 8;
                if self.length == 0 {
                    State::Chk1
                } else {
                    self.payload.reserve(usize::from(self.length));
                    State::Data
                }
            }
            State::Data => {
                self.payload.push(byte);
                if self.payload.len() == usize::from(self.length) {
                    State::Chk1
                } else {
                    State::Data
                }
            }
            State::Chk1 => {
                self.chk_lo = byte;
                State::Chk2
            }
            State::Chk2 => {
                let received = u16::from_le_bytes([self.chk_lo, byte]);
                let expected = checksum(self.address, self.function, self.length, &self.payload);
                if received != expected {
                    return Err(ParseError::ChecksumInvalid { expected, received });
                }
                State::End1
            }
            State::End1 if byte == END1 => State::End2,
            State::End2 if byte == END2 => State::Finished,
            State::End1 | State::End2 => return Err(ParseError::ExpectedEnd),
            State::Finished => return Err(ParseError::Finished),
        };
        self.raw.push(byte);
        Ok(())
    }
}

impl Default for ZenSyncParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser for ZenSyncParser {
    fn parse(&mut self, input: &mut &[u8]) -> Result<ParseStatus> {
        if self.state == State::Finished {
            return Err(ParseError::Finished);
        }
        while let Some((&byte, rest)) = input.split_first() {
            self.step(byte)?;
            *input = rest;
            if self.state == State::Finished {
                let payload = Bytes::from(std::mem::take(&mut self.payload));
                return Ok(ParseStatus::Complete(Frame::new(self.address, self.function, payload)));
            }
        }
        Ok(ParseStatus::NeedMoreBytes)
    }

    fn pending(&self) -> &[u8] {
        &self.raw
    }

    fn finished(&self) -> bool {
        self.state == State::Finished
    }

    fn reset(&mut self) {
        self.state = State::Start;
        self.raw.clear();
        self.payload.clear();
        self.length = 0;
    }
}
