//! # openzen
//!
//! LPMS 传感器命令行工具：连接传感器并转储采样、列举设备、解码抓包、检查配置。

mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use cli::{Cli, Commands, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format, cli.log_level()) {
        eprintln!("openzen: {e}");
        return ExitCode::FAILURE;
    }
    info!(version = env!("CARGO_PKG_VERSION"), command = cli.command.name(), "openzen starting");

    let result = match &cli.command {
        Commands::Stream(args) => commands::run_stream(args).await,
        Commands::List(args) => commands::run_list(args).await,
        Commands::Decode(args) => commands::run_decode(args),
        Commands::Validate(args) => commands::run_validate(args),
        Commands::Info(args) => commands::run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(command = cli.command.name(), error = %format_args!("{e:#}"), "Command failed");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries command output.
fn init_logging(format: LogFormat, level: &str) -> anyhow::Result<()> {
    let filter = observability::env_filter(level);
    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
