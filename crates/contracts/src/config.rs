//! ZenConfig - runtime configuration shared across crates
//!
//! 由 `config_loader` 从 TOML / JSON 加载，所有字段均有默认值。

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 线上帧格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// 二进制长度前缀帧 (0x3A ... 0x0D 0x0A)
    #[default]
    #[serde(alias = "zen_sync")]
    Zensync,
    /// ASCII 十六进制帧
    Ascii,
    /// RTU 帧 (CRC16)
    Rtu,
}

impl Framing {
    /// 指标与日志中使用的名字
    pub const fn label(self) -> &'static str {
        match self {
            Self::Zensync => "zensync",
            Self::Ascii => "ascii",
            Self::Rtu => "rtu",
        }
    }
}

/// 队列满时的丢弃策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最旧的事件
    DropOldest,
    /// 丢弃最新的事件
    #[default]
    DropNewest,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ZenConfig {
    #[serde(default)]
    #[validate(nested)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    #[validate(nested)]
    pub events: EventsConfig,

    #[serde(default)]
    #[validate(nested)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// 协议层参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProtocolConfig {
    /// sendAndWait* 超时 (ms)
    #[serde(default = "default_io_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub io_timeout_ms: u64,

    /// 协商每一步的超时 (ms)
    #[serde(default = "default_negotiation_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub negotiation_timeout_ms: u64,

    /// 调用方未指定时使用的波特率
    #[serde(default = "default_baud_rate")]
    #[validate(range(min = 1))]
    pub default_baud_rate: u32,

    /// 初始帧格式
    #[serde(default)]
    pub framing: Framing,
}

fn default_io_timeout_ms() -> u64 {
    2500
}

fn default_negotiation_timeout_ms() -> u64 {
    2000
}

fn default_baud_rate() -> u32 {
    921_600
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: default_io_timeout_ms(),
            negotiation_timeout_ms: default_negotiation_timeout_ms(),
            default_baud_rate: default_baud_rate(),
            framing: Framing::default(),
        }
    }
}

/// 订阅队列参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EventsConfig {
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    #[serde(default)]
    pub drop_policy: DropPolicy,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            drop_policy: DropPolicy::default(),
        }
    }
}

/// 事件转发参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_relay"))]
pub struct RelayConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_relay_endpoint")]
    pub endpoint: String,
}

fn default_relay_endpoint() -> String {
    "127.0.0.1:8899".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_relay_endpoint(),
        }
    }
}

fn validate_relay(relay: &RelayConfig) -> Result<(), ValidationError> {
    if relay.enabled && relay.endpoint.parse::<SocketAddr>().is_err() {
        let mut error = ValidationError::new("endpoint");
        error.message = Some(format!("'{}' is not a socket address", relay.endpoint).into());
        return Err(error);
    }
    Ok(())
}

/// 可观测性参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus 端口 (None 表示不启用)
    #[serde(default)]
    pub metrics_port: Option<u16>,

    #[serde(default = "default_log_level")]
    pub default_log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            metrics_port: None,
            default_log_level: default_log_level(),
        }
    }
}
