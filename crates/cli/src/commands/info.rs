//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::ZenConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Effective configuration plus build details, for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: &'static str,
    source: String,
    io_systems: Vec<String>,
    config: &'a ZenConfig,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None => "defaults".to_string(),
    };
    info!(source = %source, "Loading configuration info");

    let config = super::load_config(args.config.as_deref())?;
    let io_systems = openzen::IoRegistry::new()
        .available()
        .iter()
        .map(|system| system.io_type().to_string())
        .collect();

    let info = ConfigInfo {
        version: env!("CARGO_PKG_VERSION"),
        source,
        io_systems,
        config: &config,
    };

    if args.json {
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn print_config_info(info: &ConfigInfo<'_>) {
    let config = info.config;
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  OpenZen Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("   Version {} (from {})", info.version, info.source);

    let protocol = &config.protocol;
    println!("\n🔌 Protocol");
    println!("   ├─ Framing: {}", protocol.framing.label());
    println!("   ├─ IO timeout: {} ms", protocol.io_timeout_ms);
    println!("   ├─ Negotiation timeout: {} ms", protocol.negotiation_timeout_ms);
    println!("   └─ Default baud rate: {}", protocol.default_baud_rate);

    println!("\n📬 Events");
    println!("   ├─ Queue capacity: {}", config.events.queue_capacity);
    println!("   └─ Drop policy: {:?}", config.events.drop_policy);

    println!("\n📤 Relay");
    if config.relay.enabled {
        println!("   └─ UDP {}", config.relay.endpoint);
    } else {
        println!("   └─ disabled");
    }

    let observability = &config.observability;
    println!("\n📈 Observability");
    println!("   ├─ Log format: {:?}", observability.log_format);
    println!("   ├─ Default level: {}", observability.default_log_level);
    match observability.metrics_port {
        Some(port) => println!("   └─ Prometheus: 0.0.0.0:{}", port),
        None => println!("   └─ Prometheus: disabled"),
    }

    println!("\n🧭 IO systems ({})", info.io_systems.len());
    for (i, io_type) in info.io_systems.iter().enumerate() {
        let prefix = if i + 1 == info.io_systems.len() { "└─" } else { "├─" };
        println!("   {} {}", prefix, io_type);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_without_config_uses_defaults() {
        let args = InfoArgs {
            config: None,
            json: true,
        };
        assert!(run_info(&args).is_ok());
    }

    #[test]
    fn test_info_missing_config() {
        let args = InfoArgs {
            config: Some("missing.toml".into()),
            json: false,
        };
        let err = run_info(&args).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
