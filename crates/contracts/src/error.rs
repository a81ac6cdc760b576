//! Layered error definitions
//!
//! Categorized by source: protocol codes (`ZenError`), sensor init (`SensorInitError`),
//! async upload status (`AsyncStatus`) and config / io (`ContractError`).

use thiserror::Error;

/// Generates a `Copy` error enum together with its stable numeric code table.
macro_rules! coded_errors {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $msg:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
        pub enum $name {
            $( $(#[$vmeta])* #[error($msg)] $variant, )*
        }

        impl $name {
            /// Numeric code of this error, stable across releases.
            pub const fn code(self) -> u32 {
                match self {
                    $( Self::$variant => $code, )*
                }
            }

            /// Inverse of [`Self::code`]. Returns `None` for `0` and unknown codes.
            pub const fn from_code(code: u32) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

coded_errors! {
    /// Error returned by every sensor-facing operation.
    ///
    /// Success (`ZenError_None`, code 0) is expressed as `Ok(..)`.
    pub enum ZenError {
        // ===== Argument Errors =====
        Unknown = 1 => "unknown error",
        IsNull = 10 => "argument is null",
        NotNull = 11 => "argument is not null",
        WrongDataType = 12 => "wrong data type for property",
        BufferTooSmall = 13 => "buffer too small",
        InvalidArgument = 14 => "invalid argument",
        NotSupported = 15 => "operation not supported",

        // ===== Lifecycle Errors =====
        AlreadyInitialized = 20 => "already initialized",
        NotInitialized = 21 => "not initialized",

        // ===== Discovery Errors =====
        IoTypeInvalid = 30 => "invalid io type",
        VersionNotSupported = 31 => "protocol version not supported",
        ListingFailed = 32 => "sensor listing failed",
        WrongSensorType = 40 => "wrong sensor type",
        WrongIoType = 41 => "wrong io type",
        UnknownDeviceId = 42 => "unknown device id",

        // ===== I/O Errors =====
        IoAlreadyInitialized = 800 => "io interface already initialized",
        IoNotInitialized = 801 => "io interface not initialized",
        IoInitFailed = 802 => "io init failed",
        IoDeinitFailed = 803 => "io deinit failed",
        IoReadFailed = 804 => "io read failed",
        IoSendFailed = 805 => "io send failed",
        IoGetFailed = 806 => "io get failed",
        IoSetFailed = 807 => "io set failed",
        IoBusy = 811 => "another request is outstanding",
        IoTimeout = 812 => "request timed out",
        IoUnexpectedFunction = 813 => "reply does not match the outstanding request",
        IoUnsupportedFunction = 814 => "unsupported function",
        IoMsgCorrupt = 815 => "message corrupt",
        IoMsgTooBig = 816 => "message too big",
        IoExpectedAck = 820 => "expected an acknowledgement",
        IoBaudratesUnknown = 821 => "supported baud rates unknown",

        // ===== Protocol / Property Errors =====
        UnknownProperty = 850 => "unknown property",
        UnknownCommandMode = 851 => "unknown command mode",
        UnsupportedEvent = 852 => "unsupported event",
        FwFunctionFailed = 900 => "firmware rejected the request",

        // ===== CAN Bus Errors =====
        CanBusError = 1001 => "can bus error",
        CanOutOfAddresses = 1002 => "can bus out of addresses",
        CanResetFailed = 1006 => "can bus reset failed",
        CanAddressOutOfRange = 1009 => "can address out of range",

        // ===== Handle Errors =====
        InvalidClientHandle = 2000 => "invalid client handle",
        InvalidSensorHandle = 2001 => "invalid sensor handle",
        InvalidComponentHandle = 2002 => "invalid component handle",
    }
}

coded_errors! {
    /// Failure while obtaining or initializing a sensor.
    pub enum SensorInitError {
        InvalidHandle = 1 => "invalid handle",
        IsNull = 2 => "argument is null",
        UnsupportedComponent = 3 => "unsupported component",
        UnsupportedDataFormat = 4 => "unsupported data format",
        UnsupportedIoType = 5 => "unsupported io type",
        UnsupportedProtocol = 6 => "unsupported protocol",
        ConnectFailed = 7 => "connect failed",
        IoFailed = 8 => "io failed",
        RetrieveFailed = 9 => "retrieving sensor state failed",
        SetBaudRateFailed = 10 => "setting the baud rate failed",
        SendFailed = 11 => "send failed",
        IncompatibleBaudRates = 12 => "incompatible baud rates",
        InvalidAddress = 13 => "invalid address",
        InvalidConfig = 14 => "invalid sensor configuration",
        Timeout = 15 => "negotiation timed out",
        NoConfiguration = 16 => "no configuration for sensor model",
    }
}

/// `Result` alias used across the sensor stack.
pub type ZenResult<T> = Result<T, ZenError>;

/// Status of an asynchronous firmware / IAP upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncStatus {
    Finished,
    ThreadBusy,
    InvalidArgument,
    Updating,
    Failed,
}

/// Unified error type for configuration and io.
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sensor Errors =====
    /// Protocol error surfaced by a sensor operation
    #[error("sensor error: {0}")]
    Zen(#[from] ZenError),

    /// Sensor could not be obtained
    #[error("sensor init error: {0}")]
    Init(#[from] SensorInitError),

    // ===== Relay Errors =====
    /// Event relay write failed
    #[error("sink '{sink_name}' write failed: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        assert_eq!(ZenError::IoBusy.code(), 811);
        assert_eq!(ZenError::from_code(812), Some(ZenError::IoTimeout));
        assert_eq!(ZenError::from_code(900), Some(ZenError::FwFunctionFailed));
        assert_eq!(ZenError::from_code(0), None);
        assert_eq!(SensorInitError::from_code(15), Some(SensorInitError::Timeout));
    }

    #[test]
    fn test_contract_error_from_zen() {
        let err: ContractError = ZenError::InvalidSensorHandle.into();
        assert!(err.to_string().contains("invalid sensor handle"));
    }
}
