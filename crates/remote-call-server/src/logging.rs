//! Tracing subscriber setup.
//!
//! Services call [`init_with_config`] once at startup and use the `tracing`
//! macros everywhere else. `RUST_LOG` wins over the configured level.

use crate::error::{ServerError, ServerResult};
use crate::json_layer::JsonLayer;
use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output on stderr.
    #[default]
    Compact,
    /// JSON lines on stdout.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name stamped on every JSON line.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "remote_call_core=debug").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "remote-call-server".into(),
            default_level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

fn build_filter(default_level: &str) -> ServerResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            ServerError::Config(format!("invalid log level '{}': {}", default_level, e))
        }),
    }
}

/// Install the global subscriber.
///
/// Fails if the level directive does not parse or a global subscriber is
/// already installed.
pub fn init_with_config(config: &LogConfig) -> ServerResult<()> {
    let filter = build_filter(&config.default_level)?;

    let json_layer = match config.format {
        LogFormat::Json => Some(JsonLayer::new(config.service_name.clone(), io::stdout)),
        LogFormat::Compact => None,
    };
    let compact_layer = match config.format {
        LogFormat::Compact => Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr),
        ),
        LogFormat::Json => None,
    };

    tracing_subscriber::registry()
        .with(json_layer.with_filter(filter.clone()))
        .with(compact_layer.with_filter(filter))
        .try_init()
        .map_err(|e| ServerError::Config(format!("failed to install subscriber: {}", e)))?;

    tracing::debug!(
        service_name = %config.service_name,
        filter = %config.default_level,
        format = ?config.format,
        "logging initialized"
    );
    Ok(())
}
