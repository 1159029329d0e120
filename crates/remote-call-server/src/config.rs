//! Configuration for the bridge server.
//!
//! Sources are layered: built-in defaults, then an optional JSON file, then
//! `BRIDGE_*` environment variables. Command-line flags are applied last by
//! the binary, and only then is the result validated.

use crate::error::{ServerError, ServerResult};
use crate::logging::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const ENV_BIND_ADDR: &str = "BRIDGE_BIND_ADDR";
pub const ENV_CALL_TIMEOUT_SECS: &str = "BRIDGE_CALL_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "BRIDGE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "BRIDGE_LOG_FORMAT";

/// Bridge server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: SocketAddr,

    /// Deadline applied to calls issued without an explicit timeout
    pub call_timeout_secs: u64,

    /// Default tracing filter directive
    pub log_level: String,

    pub log_format: LogFormat,

    /// Name stamped on JSON log lines
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            call_timeout_secs: 30,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            service_name: "remote-call-server".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build the configuration from defaults, an optional file, and the
    /// process environment.
    ///
    /// The result is not validated yet: later layers may still replace a
    /// value that would fail. Call [`ServerConfig::validate`] once every
    /// layer has been applied.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`ServerConfig::load`] with an arbitrary environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ServerError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unset keys leave the current value alone; values that fail to parse
    /// are rejected rather than ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ServerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = value.parse().map_err(|e| {
                ServerError::Config(format!("{}='{}': {}", ENV_BIND_ADDR, value, e))
            })?;
        }

        if let Some(value) = lookup(ENV_CALL_TIMEOUT_SECS) {
            self.call_timeout_secs = value.parse().map_err(|e| {
                ServerError::Config(format!("{}='{}': {}", ENV_CALL_TIMEOUT_SECS, value, e))
            })?;
        }

        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }

        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.log_format = value
                .parse()
                .map_err(|e| ServerError::Config(format!("{}: {}", ENV_LOG_FORMAT, e)))?;
        }

        Ok(())
    }

    /// Reject values that parse but make no sense.
    pub fn validate(&self) -> ServerResult<()> {
        if self.call_timeout_secs == 0 {
            return Err(ServerError::Config(
                "call timeout must be at least one second".to_string(),
            ));
        }
        if self.service_name.trim().is_empty() {
            return Err(ServerError::Config("service name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            service_name: self.service_name.clone(),
            default_level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}
