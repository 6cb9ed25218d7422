//! Application configuration.
//!
//! Layered: a base file (`config.json`/`config.toml`, optional) overridden
//! by environment variables prefixed `TTY_AGENT_`, with `__` as the
//! nesting separator (e.g. `TTY_AGENT_WS__HEARTBEAT_INTERVAL_MS=15000`).
//! Every section implements `Default` so a missing config file still
//! yields a usable, permissive configuration.

use std::collections::HashSet;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ws: WsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from `config.json`/`config.toml` in the current
    /// directory (if present) layered with `TTY_AGENT_*` environment
    /// variables. Falls back to defaults if no file is present.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("TTY_AGENT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Informational flag surfaced in startup logs; does not relax CORS or
    /// the WebSocket origin allowlist. Never enable in production.
    pub development_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            development_mode: false,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// WebSocket / ticket knobs referenced throughout the gateway's core modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub max_payload_bytes: usize,
    pub heartbeat_interval_ms: u64,
    pub auth_timeout_ms: u64,
    pub ticket_ttl_ms: u64,
    pub ticket_max_kubeconfig_bytes: usize,
    /// Empty set means "allow all origins".
    pub allowed_origins: HashSet<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            heartbeat_interval_ms: 30_000,
            auth_timeout_ms: 10_000,
            ticket_ttl_ms: 60_000,
            ticket_max_kubeconfig_bytes: 64 * 1024,
            allowed_origins: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" (production) or "pretty" (development).
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}
