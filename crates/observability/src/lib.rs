//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出
//! - 协议栈各层的指标上报函数
//!
//! 库 crate 只上报指标、不安装 subscriber；初始化由可执行程序完成。
//!
//! ## 使用示例
//!
//! ```ignore
//! use contracts::ObservabilitySettings;
//!
//! observability::init_with_config(&ObservabilitySettings::default())?;
//! observability::metrics::set_live_sensors(1);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use contracts::{LogFormat, ObservabilitySettings};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-exports
pub use crate::metrics::{
    record_event_dispatched, record_event_dropped, record_frame_parsed, record_event_unclaimed,
    record_request_busy, record_request_latency, record_request_timeout, record_resync,
    set_live_sensors,
};

/// 使用默认配置初始化
///
/// - Tracing: JSON 格式，支持 RUST_LOG 环境变量
/// - Prometheus: 不启用
pub fn init() -> Result<()> {
    init_with_config(&ObservabilitySettings::default())
}

/// 构造日志过滤器：RUST_LOG 优先，否则使用 `default_level`
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 使用自定义配置初始化
pub fn init_with_config(config: &ObservabilitySettings) -> Result<()> {
    // 1. Initialize Tracing
    let filter = env_filter(&config.default_log_level);

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_thread_names(true))
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    // 2. Initialize Prometheus Exporter (if enabled)
    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;
    crate::metrics::describe();

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
