//! `decode` command implementation.

use anyhow::{Context, Result};
use contracts::{Frame, Framing};
use ingestion::decode_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::DecodeArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct DecodedFrame {
    address: u8,
    function: u8,
    payload: String,
}

#[derive(Serialize)]
struct DecodeReport {
    framing: &'static str,
    bytes: usize,
    discarded: usize,
    frames: Vec<DecodedFrame>,
}

/// Execute the `decode` command
pub fn run_decode(args: &DecodeArgs) -> Result<()> {
    let framing = Framing::from(args.framing);
    let data = parse_hex(&args.hex.join(" ")).context("Failed to read the wire dump")?;
    info!(framing = framing.label(), bytes = data.len(), "Decoding wire dump");

    let report = decode(framing, &data);
    debug!(frames = report.frames.len(), discarded = report.discarded, "Decoded");

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize frames")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn decode(framing: Framing, data: &[u8]) -> DecodeReport {
    let (frames, discarded) = decode_all(framing, data);
    DecodeReport {
        framing: framing.label(),
        bytes: data.len(),
        discarded,
        frames: frames.iter().map(describe).collect(),
    }
}

fn describe(frame: &Frame) -> DecodedFrame {
    DecodedFrame {
        address: frame.address,
        function: frame.function,
        payload: to_hex(&frame.payload),
    }
}

/// Parse hex text. Whitespace, `,` / `:` separators and `0x` prefixes are
/// ignored.
fn parse_hex(text: &str) -> Result<Vec<u8>, CliError> {
    let mut digits = Vec::with_capacity(text.len());
    for token in text.split(|c: char| c.is_whitespace() || c == ',' || c == ':') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        digits.extend(token.chars());
    }

    if digits.len() % 2 != 0 {
        return Err(CliError::invalid_hex(digits.len(), "odd number of hex digits"));
    }

    digits
        .chunks(2)
        .enumerate()
        .map(|(index, pair)| {
            let high = pair[0].to_digit(16);
            let low = pair[1].to_digit(16);
            match (high, low) {
                (Some(high), Some(low)) => Ok((high * 16 + low) as u8),
                _ => Err(CliError::invalid_hex(index, format!("'{}{}' is not a hex byte", pair[0], pair[1]))),
            }
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_report(report: &DecodeReport) {
    println!(
        "{} bytes, framing {}, {} frame(s), {} byte(s) skipped",
        report.bytes,
        report.framing,
        report.frames.len(),
        report.discarded
    );
    for (i, frame) in report.frames.iter().enumerate() {
        println!(
            "  #{:<3} addr={:<3} fn={:<3} len={:<3} [{}]",
            i,
            frame.address,
            frame.function,
            frame.payload.split_whitespace().count(),
            frame.payload
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::FrameCodec;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x3A 00,0a:FF").unwrap(), vec![0x3A, 0x00, 0x0A, 0xFF]);
        assert!(matches!(parse_hex("3A0"), Err(CliError::InvalidHex { .. })));
        assert!(matches!(parse_hex("zz"), Err(CliError::InvalidHex { offset: 0, .. })));
    }

    #[test]
    fn test_decode_with_garbage_prefix() {
        let mut data = vec![0x1A, 0x00, 0x01];
        data.extend(Framing::Zensync.encode(10, 11, &[1, 2, 3, 4]).unwrap());

        let report = decode(Framing::Zensync, &data);
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].address, 10);
        assert_eq!(report.frames[0].function, 11);
        assert_eq!(report.frames[0].payload, "01 02 03 04");
        assert!(report.discarded <= 3);
    }
}
