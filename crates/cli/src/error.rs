//! Error types for CLI operations.

use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Input is not a hex dump
    #[error("Invalid hex input at offset {offset}: {message}")]
    InvalidHex { offset: usize, message: String },

    #[error("Sensor listing did not finish within {seconds} s")]
    ListingTimeout { seconds: u64 },

    /// The client queue was closed under a running command
    #[error("Event queue closed")]
    QueueClosed,

    #[error("No sensor given; pass --sensor or --simulate")]
    MissingSensor,

    #[error("Could not obtain sensor {identifier}: {reason}")]
    ObtainFailed { identifier: String, reason: String },

    #[error("Sensor has no {kind} component")]
    NoComponent { kind: String },

    /// 超过空闲时限没有新的采样
    #[error("No sample within {seconds} s ({printed} printed)")]
    SampleTimeout { printed: usize, seconds: u64 },

    #[error("Sensor disconnected: {reason}")]
    SensorLost { reason: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_hex(offset: usize, message: impl Into<String>) -> Self {
        Self::InvalidHex {
            offset,
            message: message.into(),
        }
    }

    pub fn obtain_failed(identifier: impl Into<String>, reason: impl Display) -> Self {
        Self::ObtainFailed {
            identifier: identifier.into(),
            reason: reason.to_string(),
        }
    }
}
