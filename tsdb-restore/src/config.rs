//! Configuration management for the restore client.
//!
//! Loads configuration from an optional TOML file with `TSDB_` environment
//! variable overrides (`TSDB_SERVER__HOST`, `TSDB_SERVER__TOKEN`,
//! `TSDB_SERVER__SKIP_VERIFY`, `TSDB_LOG__LEVEL`). Command-line flags are applied on top by the caller.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::{RestoreError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the tsdb server
    #[serde(default = "default_host")]
    pub host: String,

    /// API token, sent as `Authorization: Token <token>` when set
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds; zero disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Accept any TLS certificate the server presents
    #[serde(default)]
    pub skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_host() -> String {
    "http://localhost:8086".to_string()
}

fn default_timeout_secs() -> u64 {
    0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            token: None,
            timeout_secs: default_timeout_secs(),
            skip_verify: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`ClientConfig::load`], reading overrides from `env` instead of
    /// the process environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TSDB")
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RestoreError::Config(e.to_string()))
    }
}
