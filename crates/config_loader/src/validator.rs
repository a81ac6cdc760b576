//! 配置校验模块
//!
//! 校验规则：
//! - 超时在 1..=60000 ms 之间 (字段上的 `validator` 规则)
//! - queue_capacity >= 1，default_baud_rate > 0
//! - 启用转发时 endpoint 必须是合法的 socket 地址
//! - 协商单步超时不超过请求超时
//! - metrics_port 不为 0

use std::borrow::Cow;

use contracts::{ContractError, ZenConfig};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 ZenConfig
///
/// 返回第一个遇到的错误 (按字段路径排序)，或 Ok(())。
pub fn validate(config: &ZenConfig) -> Result<(), ContractError> {
    if let Err(errors) = config.validate() {
        let mut flat = Vec::new();
        flatten(&errors, "", &mut flat);
        flat.sort();
        let (field, message) = flat
            .into_iter()
            .next()
            .unwrap_or_else(|| ("<config>".to_string(), "invalid configuration".to_string()));
        return Err(ContractError::config_validation(field, message));
    }
    validate_timeouts(config)?;
    validate_metrics_port(config)?;
    Ok(())
}

/// 把嵌套的校验错误展开成 (字段路径, 消息)
fn flatten(errors: &ValidationErrors, prefix: &str, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = join(prefix, field);
        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .clone()
                        .unwrap_or_else(|| Cow::Owned(format!("failed rule '{}'", error.code)));
                    out.push((path.clone(), message.into_owned()));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn join(prefix: &str, field: &str) -> String {
    // schema 级规则挂在 "__all__" 下
    match (prefix.is_empty(), field) {
        (_, "__all__") if !prefix.is_empty() => prefix.to_string(),
        (true, _) => field.to_string(),
        (false, _) => format!("{prefix}.{field}"),
    }
}

/// 校验协商超时
fn validate_timeouts(config: &ZenConfig) -> Result<(), ContractError> {
    let protocol = &config.protocol;
    if protocol.negotiation_timeout_ms > protocol.io_timeout_ms {
        return Err(ContractError::config_validation(
            "protocol.negotiation_timeout_ms",
            format!(
                "negotiation_timeout_ms ({}) must be <= io_timeout_ms ({})",
                protocol.negotiation_timeout_ms, protocol.io_timeout_ms
            ),
        ));
    }
    Ok(())
}

fn validate_metrics_port(config: &ZenConfig) -> Result<(), ContractError> {
    if config.observability.metrics_port == Some(0) {
        return Err(ContractError::config_validation(
            "observability.metrics_port",
            "metrics_port cannot be 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&ZenConfig::default()).is_ok());
    }

    #[test]
    fn test_timeout_out_of_range() {
        let mut config = ZenConfig::default();
        config.protocol.io_timeout_ms = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("protocol.io_timeout_ms"), "got: {err}");

        config.protocol.io_timeout_ms = 60_001;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = ZenConfig::default();
        config.events.queue_capacity = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("events.queue_capacity"), "got: {err}");
    }

    #[test]
    fn test_zero_baud_rate() {
        let mut config = ZenConfig::default();
        config.protocol.default_baud_rate = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("default_baud_rate"), "got: {err}");
    }

    #[test]
    fn test_relay_endpoint() {
        let mut config = ZenConfig::default();
        config.relay.enabled = true;
        config.relay.endpoint = "localhost".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("relay"), "got: {err}");
        assert!(err.contains("not a socket address"), "got: {err}");
    }

    #[test]
    fn test_negotiation_longer_than_io_timeout() {
        let mut config = ZenConfig::default();
        config.protocol.negotiation_timeout_ms = 3000;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("must be <= io_timeout_ms"), "got: {err}");
    }

    #[test]
    fn test_metrics_port_zero() {
        let mut config = ZenConfig::default();
        config.observability.metrics_port = Some(0);
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("cannot be 0"), "got: {err}");
    }
}
