//! RTU binary framing
//!
//! `addr | fn | len | payload | crc_lo | crc_hi`, CRC16/IBM (reflected 0xA001,
//! init 0xFFFF) over everything before the checksum.

use bytes::Bytes;
use contracts::Frame;

use super::{FrameParser, ParseStatus};
use crate::error::{ParseError, Result};

const CRC_TABLE: [u16; 256] = crc_table();

const fn crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc_update(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ CRC_TABLE[usize::from((crc ^ u16::from(byte)) as u8)]
}

/// CRC16/IBM (Modbus) of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, byte| crc_update(crc, *byte))
}

fn frame_crc(address: u8, function: u8, payload: &[u8]) -> u16 {
    let head = [address, function, payload.len() as u8];
    payload
        .iter()
        .fold(crc16(&head), |crc, byte| crc_update(crc, *byte))
}

pub(super) fn encode(address: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.extend_from_slice(&[address, function, payload.len() as u8]);
    out.extend_from_slice(payload);
    out.extend_from_slice(&frame_crc(address, function, payload).to_le_bytes());
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Address,
    Function,
    Length,
    Data,
    Chk1,
    Chk2,
    Finished,
}

/// Byte-at-a-time RTU parser. There is no start marker, so any byte opens a frame.
pub struct RtuParser {
    state: State,
    raw: Vec<u8>,
    address: u8,
    function: u8,
    length: u8,
    payload: Vec<u8>,
    chk_lo: u8,
}

impl RtuParser {
    pub fn new() -> Self {
        Self {
            state: State::Address,
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
            State::Address => {
                self.address = byte;
                State::Function
            }
            State::Function => {
                self.function = byte;
                State::Length
            }
            State::Length => {
                self.length = byte;
                if byte == 0 {
                    State::Chk1
                } else {
                    self.payload.reserve(usize::from(byte));
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
                let expected = frame_crc(self.address, self.function, &self.payload);
                if received != expected {
                    return Err(ParseError::ChecksumInvalid { expected, received });
                }
                State::Finished
            }
            State::Finished => return Err(ParseError::Finished),
        };
        self.raw.push(byte);
        Ok(())
    }
}

impl Default for RtuParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser for RtuParser {
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
        self.state = State::Address;
        self.raw.clear();
        self.payload.clear();
        self.length = 0;
    }
}
