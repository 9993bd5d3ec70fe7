//! # Configuration Management
//!
//! Centralized configuration for the protocol client.
//!
//! This module provides structured configuration for the client session
//! (identity, dispatcher deadlines, keepalive window, decode limits) and for
//! logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`CHATWIRE_*`)
//!
//! ## Notes
//! - Every dispatcher wait carries a deadline; `response_timeout` is the default
//! - The keepalive window is half-open: `[keepalive_min, keepalive_max)`

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed envelope size on a byte stream (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default cap on binary node nesting
pub const MAX_NODE_DEPTH: usize = crate::core::decoder::DEFAULT_MAX_DEPTH;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Client session configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `CHATWIRE_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("CHATWIRE_CLIENT_ID") {
            self.client.client_id = id;
        }

        if let Some(val) = lookup("CHATWIRE_RESPONSE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.client.response_timeout = Duration::from_millis(val);
        }

        if let Some(val) = lookup("CHATWIRE_KEEPALIVE_MIN_MS").and_then(|v| v.parse().ok()) {
            self.client.keepalive_min = Duration::from_millis(val);
        }

        if let Some(val) = lookup("CHATWIRE_KEEPALIVE_MAX_MS").and_then(|v| v.parse().ok()) {
            self.client.keepalive_max = Duration::from_millis(val);
        }

        if let Some(level) = lookup("CHATWIRE_LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.logging.log_level = level;
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Identifier sent with login and challenge requests
    pub client_id: String,

    /// Deadline for correlated responses
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,

    /// Lower bound of the keepalive interval (inclusive)
    #[serde(with = "duration_serde")]
    pub keepalive_min: Duration,

    /// Upper bound of the keepalive interval (exclusive)
    #[serde(with = "duration_serde")]
    pub keepalive_max: Duration,

    /// How often the driver checks whether a keepalive is due
    #[serde(with = "duration_serde")]
    pub keepalive_tick: Duration,

    /// Maximum envelope size accepted from a byte stream
    pub max_frame_size: usize,

    /// Maximum nesting of binary node lists
    pub max_node_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: generate_client_id(),
            response_timeout: timeout::RESPONSE_TIMEOUT,
            keepalive_min: timeout::KEEPALIVE_MIN,
            keepalive_max: timeout::KEEPALIVE_MAX,
            keepalive_tick: timeout::KEEPALIVE_TICK,
            max_frame_size: MAX_FRAME_SIZE,
            max_node_depth: MAX_NODE_DEPTH,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.client_id.is_empty() {
            errors.push("Client id cannot be empty".to_string());
        } else if self.client_id.contains(',') || self.client_id.contains('"') {
            errors.push(format!(
                "Client id contains reserved characters: '{}'",
                self.client_id
            ));
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        } else if self.response_timeout.as_secs() > 300 {
            errors.push("Response timeout too long (maximum: 300s)".to_string());
        }

        if self.keepalive_min.is_zero() {
            errors.push("Keepalive minimum must be greater than 0".to_string());
        }

        if self.keepalive_max <= self.keepalive_min {
            errors.push(format!(
                "Keepalive window is empty: [{:?}, {:?})",
                self.keepalive_min, self.keepalive_max
            ));
        }

        if self.keepalive_tick.as_millis() < 10 {
            errors.push("Keepalive tick too short (minimum: 10ms)".to_string());
        } else if self.keepalive_tick > self.keepalive_min {
            errors.push("Keepalive tick longer than the keepalive minimum".to_string());
        }

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_frame_size
            ));
        }

        if self.max_node_depth == 0 {
            errors.push("Max node depth must be greater than 0".to_string());
        } else if self.max_node_depth > 1024 {
            errors.push(format!(
                "Max node depth too large: {} (maximum: 1024)",
                self.max_node_depth
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("chatwire"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// 16 random bytes, lowercase hex.
fn generate_client_id() -> String {
    let mut raw = [0u8; 16];
    rand::rng().fill_bytes(&mut raw);
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
