//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::ZenConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    framing: String,
    io_timeout_ms: u64,
    queue_capacity: usize,
    relay: Option<String>,
    metrics_port: Option<u16>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    framing: config.protocol.framing.label().to_string(),
                    io_timeout_ms: config.protocol.io_timeout_ms,
                    queue_capacity: config.events.queue_capacity,
                    relay: config.relay.enabled.then(|| config.relay.endpoint.clone()),
                    metrics_port: config.observability.metrics_port,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ZenConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.events.queue_capacity < 64 {
        warnings.push(format!(
            "events.queue_capacity = {} - a 400 Hz sensor fills it in well under a second",
            config.events.queue_capacity
        ));
    }

    if config.protocol.io_timeout_ms < 100 {
        warnings.push("protocol.io_timeout_ms below 100 ms - flash writes may time out".to_string());
    }

    if !config.relay.enabled && config.relay.endpoint != contracts::RelayConfig::default().endpoint {
        warnings.push("relay.endpoint is set but relay.enabled = false".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Framing: {}", summary.framing);
            println!("  IO timeout: {} ms", summary.io_timeout_ms);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Relay: {}", summary.relay.as_deref().unwrap_or("disabled"));
            match summary.metrics_port {
                Some(port) => println!("  Metrics port: {}", port),
                None => println!("  Metrics port: disabled"),
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_with_warning() {
        let file = write_config("[events]\nqueue_capacity = 8\n");
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(result.valid);
        assert_eq!(result.warnings.map(|w| w.len()), Some(1));
        assert_eq!(result.summary.map(|s| s.queue_capacity), Some(8));
    }

    #[test]
    fn test_invalid() {
        let file = write_config("[protocol]\nio_timeout_ms = 0\n");
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("io_timeout_ms"));
        assert!(run_validate(&args).is_err());
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "does-not-exist.toml".into(),
            json: false,
        };
        assert!(validate_config(&args).error.unwrap().contains("File not found"));
    }
}
