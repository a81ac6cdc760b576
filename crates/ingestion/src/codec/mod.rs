//! Frame codecs
//!
//! Three independent framings share one interface: a stateless encoder and an
//! incremental, byte-at-a-time parser. A parser consumes bytes until a frame
//! completes, then stays finished until `reset`.

mod ascii;
mod rtu;
mod zensync;

pub use ascii::AsciiParser;
pub use rtu::{crc16, RtuParser};
pub use zensync::ZenSyncParser;

use std::borrow::Cow;

use contracts::{Frame, Framing, ZenError, ZenResult, MAX_PAYLOAD_LEN};

use crate::error::{ParseError, Result};

/// Outcome of a successful `parse` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    /// Input exhausted before the frame completed
    NeedMoreBytes,
    /// A whole frame was decoded; the parser is now finished
    Complete(Frame),
}

/// Incremental frame parser.
///
/// `parse` advances `input` past every byte it accepts. On error the offending
/// byte is left at the front of `input`; the bytes accepted so far for the
/// current frame remain available through [`FrameParser::pending`] so the
/// caller can resynchronize one byte past the failed frame start.
pub trait FrameParser: Send {
    fn parse(&mut self, input: &mut &[u8]) -> Result<ParseStatus>;

    /// Bytes accepted for the frame currently being assembled.
    fn pending(&self) -> &[u8];

    fn finished(&self) -> bool;

    /// Arm the parser for the next frame.
    fn reset(&mut self);
}

/// Factory side of a framing.
pub trait FrameCodec {
    /// Serialize one frame. Payloads above 255 bytes fail with `MsgTooBig`.
    fn encode(&self, address: u8, function: u8, payload: &[u8]) -> ZenResult<Vec<u8>>;

    /// Fresh parser for this framing.
    fn parser(&self) -> Box<dyn FrameParser>;
}

impl FrameCodec for Framing {
    fn encode(&self, address: u8, function: u8, payload: &[u8]) -> ZenResult<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ZenError::IoMsgTooBig);
        }
        Ok(match self {
            Framing::Zensync => zensync::encode(address, function, payload),
            Framing::Ascii => ascii::encode(address, function, payload),
            Framing::Rtu => rtu::encode(address, function, payload),
        })
    }

    fn parser(&self) -> Box<dyn FrameParser> {
        match self {
            Framing::Zensync => Box::new(ZenSyncParser::new()),
            Framing::Ascii => Box::new(AsciiParser::new()),
            Framing::Rtu => Box::new(RtuParser::new()),
        }
    }
}

/// Decode every frame in `data`, resynchronizing after errors.
///
/// Returns the frames and the number of bytes discarded while resynchronizing.
pub fn decode_all(framing: Framing, data: &[u8]) -> (Vec<Frame>, usize) {
    let mut parser = framing.parser();
    let mut frames = Vec::new();
    let mut discarded = 0;
    drive(parser.as_mut(), data, |frame| frames.push(frame), |_| discarded += 1);
    (frames, discarded)
}

/// Feed `data` through `parser`.
///
/// Completed frames go to `on_frame` in wire order. After a parse error the
/// failed frame's first byte is dropped, `on_resync` is told why, and scanning
/// restarts one byte later. Bytes of an unfinished frame stay in the parser
/// for the next call.
pub(crate) fn drive(
    parser: &mut dyn FrameParser,
    data: &[u8],
    mut on_frame: impl FnMut(Frame),
    mut on_resync: impl FnMut(ParseError),
) {
    let mut replay: Cow<'_, [u8]> = Cow::Borrowed(data);
    loop {
        let mut input: &[u8] = &replay;
        let mut failed = None;
        while !input.is_empty() {
            match parser.parse(&mut input) {
                Ok(ParseStatus::Complete(frame)) => {
                    parser.reset();
                    on_frame(frame);
                }
                Ok(ParseStatus::NeedMoreBytes) => {}
                Err(error) => {
                    on_resync(error);
                    failed = Some(resync_input(parser, input));
                    parser.reset();
                    break;
                }
            }
        }
        match failed {
            Some(next) => replay = Cow::Owned(next),
            None => break,
        }
    }
}

/// Input to re-scan after a parse error: everything after the failed frame's
/// first byte.
fn resync_input(parser: &dyn FrameParser, rest: &[u8]) -> Vec<u8> {
    let pending = parser.pending();
    let mut next = Vec::with_capacity(pending.len() + rest.len());
    if pending.is_empty() {
        next.extend_from_slice(rest.get(1..).unwrap_or_default());
    } else {
        next.extend_from_slice(&pending[1..]);
        next.extend_from_slice(rest);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const ALL: [Framing; 3] = [Framing::Zensync, Framing::Ascii, Framing::Rtu];

    #[test]
    fn test_payload_limit() {
        for framing in ALL {
            assert!(framing.encode(1, 2, &[0u8; 255]).is_ok());
            assert_eq!(framing.encode(1, 2, &[0u8; 256]), Err(ZenError::IoMsgTooBig));
        }
    }

    #[test]
    fn test_frames_split_across_chunks() {
        for framing in ALL {
            let wire = framing.encode(3, 9, b"chunked").unwrap();
            let mut parser = framing.parser();
            let (head, tail) = wire.split_at(wire.len() / 2);

            let mut input = head;
            assert_eq!(parser.parse(&mut input), Ok(ParseStatus::NeedMoreBytes));
            assert!(input.is_empty());

            let mut input = tail;
            let status = parser.parse(&mut input).unwrap();
            assert_eq!(status, ParseStatus::Complete(Frame::new(3, 9, &b"chunked"[..])));
            assert!(parser.finished());
            assert_eq!(parser.parse(&mut input), Err(crate::ParseError::Finished));
        }
    }

    #[test]
    fn test_zensync_resync_after_garbage() {
        let frame = Frame::new(10, 11, vec![1u8, 2, 3, 4]);
        let mut wire = vec![0x1A, 0x00, 0x01];
        wire.extend(Framing::Zensync.encode(10, 11, &frame.payload).unwrap());

        let (frames, discarded) = decode_all(Framing::Zensync, &wire);
        assert_eq!(frames, vec![frame]);
        assert!(discarded <= 3);
    }

    #[test]
    fn test_random_prefix_recovers() {
        let mut rng = rand::rng();
        // every byte starts an RTU frame, so only the delimited framings qualify
        for framing in [Framing::Zensync, Framing::Ascii] {
            for _ in 0..50 {
                let len = rng.random_range(0..16);
                let prefix: Vec<u8> = (0..len)
                    .map(|_| rng.random_range(0x40u8..0x60))
                    .collect();
                let payload: Vec<u8> = (0..rng.random_range(0..32)).map(|_| rng.random()).collect();

                let mut wire = prefix.clone();
                wire.extend(framing.encode(0, 9, &payload).unwrap());

                let (frames, discarded) = decode_all(framing, &wire);
                assert_eq!(frames, vec![Frame::new(0, 9, payload)], "{framing:?}");
                assert!(discarded <= prefix.len());
            }
        }
    }
}
