//! ASCII-hex framing
//!
//! Every byte after the `:` start marker travels as two uppercase hex digits,
//! low nibble first. The trailer is an LRC byte followed by `CR LF`.

use bytes::Bytes;
use contracts::Frame;

use super::{FrameParser, ParseStatus};
use crate::error::{ParseError, Result};

const START: u8 = b':';
const END1: u8 = 0x0D;
const END2: u8 = 0x0A;
const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn lrc(address: u8, function: u8, payload: &[u8]) -> u8 {
    let length = payload.len() as u8;
    payload
        .iter()
        .fold(address.wrapping_add(function).wrapping_add(length), |sum, byte| {
            sum.wrapping_add(*byte)
        })
        .wrapping_neg()
}

fn push_hex(out: &mut Vec<u8>, byte: u8) {
    out.push(HEX[usize::from(byte & 0x0F)]);
    out.push(HEX[usize::from(byte >> 4)]);
}

fn from_hex(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

pub(super) fn encode(address: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(11 + 2 * payload.len());
    out.push(START);
    push_hex(&mut out, address);
    push_hex(&mut out, function);
    push_hex(&mut out, payload.len() as u8);
    for byte in payload {
        push_hex(&mut out, *byte);
    }
    push_hex(&mut out, lrc(address, function, payload));
    out.extend_from_slice(&[END1, END2]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Address,
    Function,
    Length,
    Data,
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    /// Waiting for the low nibble of a field
    Low(Field),
    /// Waiting for the high nibble; carries the low one
    High(Field, u8),
    End1,
    End2,
    Finished,
}

/// Byte-at-a-time ASCII-hex parser.
pub struct AsciiParser {
    state: State,
    raw: Vec<u8>,
    address: u8,
    function: u8,
    length: u8,
    payload: Vec<u8>,
}

impl AsciiParser {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            raw: Vec::new(),
            address: 0,
            function: 0,
            length: 0,
            payload: Vec::new(),
        }
    }

    fn after(&self, field: Field) -> State {
        match field {
            Field::Address => State::Low(Field::Function),
            Field::Function => State::Low(Field::Length),
            Field::Length if self.length == 0 => State::Low(Field::Check),
            Field::Length => State::Low(Field::Data),
            Field::Data if self.payload.len() == usize::from(self.length) => State::Low(Field::Check),
            Field::Data => State::Low(Field::Data),
            Field::Check => State::End1,
        }
    }

    fn step(&mut self, byte: u8) -> Result<()> {
        self.state = match self.state {
            State::Start if byte == START => State::Low(Field::Address),
            State::Start => return Err(ParseError::ExpectedStart),
            State::Low(field) => {
                let low = from_hex(byte).ok_or(ParseError::UnexpectedCharacter(byte))?;
                State::High(field, low)
            }
            State::High(field, low) => {
                let high = from_hex(byte).ok_or(ParseError::UnexpectedCharacter(byte))?;
                let value = (high << 4) | low;
                match field {
                    Field::Address => self.address = value,
                    Field::Function => self.function = value,
                    Field::Length => {
                        self.length = value;
                        self.payload.reserve(usize::from(value));
                    }
                    Field::Data => self.payload.push(value),
                    Field::Check => {
                        let expected = lrc(self.address, self.function, &self.payload);
                        if value != expected {
                            return Err(ParseError::ChecksumInvalid {
                                expected: u16::from(expected),
                                received: u16::from(value),
                            });
                        }
                    }
                }
                self.after(field)
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

impl Default for AsciiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser for AsciiParser {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_nibble_first() {
        let wire = encode(0x3A, 0x01, &[]);
        assert_eq!(&wire[..5], b":A310");
        // length 0 -> "00", lrc = -(0x3A + 0x01) = 0xC5 -> "5C"
        assert_eq!(&wire[5..], b"005C\r\n");
    }

    #[test]
    fn test_lrc_is_twos_complement() {
        let payload = [0x10, 0x20];
        let sum = 0x01u8 + 0x02 + 0x02 + 0x10 + 0x20;
        assert_eq!(lrc(0x01, 0x02, &payload).wrapping_add(sum), 0);
    }

    #[test]
    fn test_rejects_lowercase_hex() {
        let mut parser = AsciiParser::new();
        let mut input: &[u8] = b":a";
        assert_eq!(
            parser.parse(&mut input),
            Err(ParseError::UnexpectedCharacter(b'a'))
        );
        assert_eq!(input, b"a");
        assert_eq!(parser.pending(), b":");
    }

    #[test]
    fn test_bad_checksum() {
        let mut wire = encode(1, 9, &[0xAB]);
        let chk = wire.len() - 4;
        wire[chk] = if wire[chk] == b'0' { b'1' } else { b'0' };
        let mut parser = AsciiParser::new();
        let mut input = wire.as_slice();
        assert!(matches!(
            parser.parse(&mut input),
            Err(ParseError::ChecksumInvalid { .. })
        ));
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let payload: Vec<u8> = (0..=254).collect();
        let wire = encode(0xFF, 0x80, &payload);
        let mut parser = AsciiParser::new();
        let mut input = wire.as_slice();
        assert_eq!(
            parser.parse(&mut input),
            Ok(ParseStatus::Complete(Frame::new(0xFF, 0x80, payload)))
        );
        assert!(input.is_empty());
    }
}
