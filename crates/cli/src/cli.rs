//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// openzen - talk to LPMS inertial sensors
#[derive(Parser, Debug)]
#[command(
    name = "openzen",
    author,
    version,
    about = "Connect to LPMS sensors, dump their samples and inspect the wire protocol",
    long_about = "Connect to LPMS inertial and GNSS sensors through the registered io systems.\n\
                  `list` shows what is reachable, `stream` obtains one sensor and dumps its\n\
                  samples, `decode` splits a captured wire dump into frames.\n\n\
                  `list` and `stream` take --simulate to run against simulated sensors."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "OPENZEN_VERBOSE")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "compact", global = true, env = "OPENZEN_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default filter directive when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain a sensor and print its samples
    #[command(visible_alias = "dump")]
    Stream(StreamArgs),

    /// List the sensors of every available io system
    List(ListArgs),

    /// Split a captured wire dump into frames
    Decode(DecodeArgs),

    /// Check a configuration file
    Validate(ValidateArgs),

    /// Show the effective configuration
    Info(InfoArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::List(_) => "list",
            Self::Decode(_) => "decode",
            Self::Validate(_) => "validate",
            Self::Info(_) => "info",
        }
    }
}

/// Arguments for the `stream` command
#[derive(Parser, Debug)]
pub struct StreamArgs {
    /// Path to configuration file
    #[arg(short, long, env = "OPENZEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sensor identifier within its io system (port name, device id)
    #[arg(short, long, required_unless_present = "simulate", conflicts_with = "simulate")]
    pub sensor: Option<String>,

    /// Io system the sensor is reached through
    #[arg(long, default_value = ingestion::mock::MOCK_IO_TYPE)]
    pub io_type: String,

    /// Baud rate for serial io systems
    #[arg(long, default_value = "921600")]
    pub baud_rate: u32,

    /// Talk to a simulated sensor of this model instead of a real one
    #[arg(long, value_enum)]
    pub simulate: Option<SimModel>,

    /// Stop after this many samples
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Only print samples of this component kind
    #[arg(long, value_enum, default_value = "all")]
    pub component: ComponentArg,

    /// Set the IMU sampling rate (Hz) before streaming
    #[arg(long)]
    pub sampling_rate: Option<i32>,

    /// Request samples every N ms instead of relying on the sensor's stream
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Give up when no sample arrived for this many seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// One JSON object per sample
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `list` command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Path to configuration file
    #[arg(short, long, env = "OPENZEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Register simulated legacy and Ig1 sensors before listing
    #[arg(long)]
    pub simulate: bool,

    /// Obtain every listed sensor and show its components
    #[arg(long)]
    pub inspect: bool,

    /// Give up after this many seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `decode` command
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Wire framing of the dump
    #[arg(short, long, value_enum, default_value = "zensync")]
    pub framing: FramingArg,

    /// Hex bytes, whitespace and `0x` prefixes allowed
    #[arg(required = true, num_args = 1..)]
    pub hex: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to check
    #[arg(short, long, default_value = "openzen.toml", env = "OPENZEN_CONFIG")]
    pub config: PathBuf,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults are shown without one
    #[arg(short, long, env = "OPENZEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

/// Wire framing
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum FramingArg {
    #[default]
    Zensync,
    Ascii,
    Rtu,
}

impl From<FramingArg> for contracts::Framing {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Zensync => Self::Zensync,
            FramingArg::Ascii => Self::Ascii,
            FramingArg::Rtu => Self::Rtu,
        }
    }
}

/// Simulated sensor models
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimModel {
    /// LPMS-IG1, IMU only
    Ig1,
    /// LPMS-IG1P, IMU and GNSS
    Ig1p,
}

impl SimModel {
    pub fn model_name(self) -> &'static str {
        match self {
            Self::Ig1 => "LPMS-IG1-RS232",
            Self::Ig1p => "LPMS-IG1P-RS232",
        }
    }
}

/// Component filter of the `stream` command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ComponentArg {
    Imu,
    Gnss,
    #[default]
    All,
}

impl ComponentArg {
    /// Component kind to query, `None` for every kind.
    pub fn kind(self) -> Option<&'static str> {
        match self {
            Self::Imu => Some("imu"),
            Self::Gnss => Some("gnss"),
            Self::All => None,
        }
    }
}
