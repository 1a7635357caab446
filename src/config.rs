//! Configuration module
//!
//! Reads `AppConfig` from a TOML file (`~/.config/texnouz-cpo/config.toml`
//! unless `OCPP_CPO_CONFIG` points elsewhere). Every field has a default, so
//! a partial file or no file at all is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::{
    AUTHORIZE_REMOTE_RESERVATION_START, AUTHORIZE_REMOTE_RESERVATION_STOP, AUTHORIZE_REMOTE_START,
    AUTHORIZE_REMOTE_STOP,
};
use crate::domain::ConfigError;
use crate::shared::RetryConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "OCPP_CPO_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// First component of every audit log file name
    pub context: String,
    pub log_dir: PathBuf,
    /// Overrides `{context}_{operation}_{date}.log`
    pub file_template: Option<String>,
    /// Attach the default console sink
    pub console: bool,
    /// Attach the default disk sink
    pub disk: bool,
    /// Operations that receive the default sinks
    pub default_sink_operations: Vec<String>,
    pub handler_timeout_ms: u64,
    pub push: PushConfig,
    pub network: NetworkConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            context: "cpo".to_string(),
            log_dir: PathBuf::from("logs"),
            file_template: None,
            console: true,
            disk: true,
            default_sink_operations: vec![
                AUTHORIZE_REMOTE_START.to_string(),
                AUTHORIZE_REMOTE_STOP.to_string(),
                AUTHORIZE_REMOTE_RESERVATION_START.to_string(),
                AUTHORIZE_REMOTE_RESERVATION_STOP.to_string(),
            ],
            handler_timeout_ms: 30_000,
            push: PushConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl AuditConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms.max(1))
    }

    pub fn wants_default_sinks(&self, operation: &str) -> bool {
        self.default_sink_operations.iter().any(|op| op == operation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    /// Records a subscriber may fall behind before it starts losing them
    pub capacity: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_attempts: 3,
            initial_delay_ms: 200,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl NetworkConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Path from `OCPP_CPO_CONFIG`, else the default location.
    pub fn resolve_path() -> PathBuf {
        std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    }
}

/// `~/.config/texnouz-cpo/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("texnouz-cpo")
        .join("config.toml")
}
