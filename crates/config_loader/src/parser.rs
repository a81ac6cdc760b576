//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON 格式。缺省的段和字段取默认值。

use contracts::{ContractError, ZenConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ZenConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ZenConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<ZenConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DropPolicy, Framing, LogFormat};

    #[test]
    fn test_parse_toml() {
        let content = r#"
[protocol]
io_timeout_ms = 1000
framing = "ascii"

[events]
queue_capacity = 16
drop_policy = "drop_oldest"

[observability]
log_format = "compact"
metrics_port = 9000
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.protocol.io_timeout_ms, 1000);
        assert_eq!(config.protocol.negotiation_timeout_ms, 2000);
        assert_eq!(config.protocol.framing, Framing::Ascii);
        assert_eq!(config.events.queue_capacity, 16);
        assert_eq!(config.events.drop_policy, DropPolicy::DropOldest);
        assert_eq!(config.observability.log_format, LogFormat::Compact);
        assert_eq!(config.observability.metrics_port, Some(9000));
        assert!(!config.relay.enabled);
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(parse_toml("").unwrap(), ZenConfig::default());
        assert_eq!(parse_json("{}").unwrap(), ZenConfig::default());
    }

    #[test]
    fn test_parse_json() {
        let content = r#"{
            "protocol": { "default_baud_rate": 115200, "framing": "rtu" },
            "relay": { "enabled": true, "endpoint": "10.0.0.2:9000" }
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.protocol.default_baud_rate, 115_200);
        assert_eq!(config.protocol.framing, Framing::Rtu);
        assert!(config.relay.enabled);
        assert_eq!(config.relay.endpoint, "10.0.0.2:9000");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_unknown_framing_rejected() {
        let result = parse_toml("[protocol]\nframing = \"morse\"\n");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
