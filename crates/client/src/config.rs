//! Configuration management for the termhop client.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/termhop/config.toml`.
//! The host inventory itself is a separate JSON file; this file only says
//! where to find it and how the client behaves.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use inventory::FallbackPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connector::HostKeyPolicy;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("input_buffer must be between 1 and 65536 bytes, got {0}")]
    InvalidInputBuffer(usize),

    #[error("default_term must not be empty")]
    EmptyTerm,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest accepted local input chunk.
const MAX_INPUT_BUFFER: usize = 64 * 1024;

/// Terminal type announced to the server when `TERM` is unset.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Main configuration structure for the termhop client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Where the host inventory lives and how selection behaves.
    pub inventory: InventoryConfig,

    /// Local terminal handling.
    pub terminal: TerminalConfig,

    /// SSH connection settings.
    pub connection: ConnectionConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Inventory configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InventoryConfig {
    /// Path to the JSON inventory file.
    pub path: PathBuf,

    /// What to do when interactive selection matches nothing.
    pub fallback: FallbackPolicy,
}

/// Terminal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Terminal type used when `TERM` is not set.
    pub default_term: String,

    /// Size in bytes of each local input chunk sent to the remote side.
    pub input_buffer: usize,
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Seconds to wait for the TCP connection and handshake (0 = no limit).
    pub connect_timeout_secs: u64,

    /// How the server's host key is verified.
    pub host_key_policy: HostKeyPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config.json"),
            fallback: FallbackPolicy::First,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_term: DEFAULT_TERM.to_string(),
            input_buffer: 128,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            // Anything chattier interleaves with the remote shell on stderr.
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl ConnectionConfig {
    /// Returns the connect timeout, or `None` when disabled.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termhop")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TERMHOP_INVENTORY: Override the inventory file path
    /// - TERMHOP_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Returns the `(variable, value)` pairs that were applied, so they can be
    /// logged once logging is set up.
    pub fn apply_env_overrides(&mut self) -> Vec<(&'static str, String)> {
        let mut applied = Vec::new();

        if let Ok(path) = std::env::var("TERMHOP_INVENTORY") {
            if !path.is_empty() {
                self.inventory.path = PathBuf::from(&path);
                applied.push(("TERMHOP_INVENTORY", path));
            }
        }

        if let Ok(level) = std::env::var("TERMHOP_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level.clone();
                applied.push(("TERMHOP_LOG_LEVEL", level));
            }
        }

        applied
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let buffer = self.terminal.input_buffer;
        if buffer == 0 || buffer > MAX_INPUT_BUFFER {
            return Err(ConfigError::InvalidInputBuffer(buffer));
        }

        if self.terminal.default_term.trim().is_empty() {
            return Err(ConfigError::EmptyTerm);
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.inventory.path, PathBuf::from("config.json"));
        assert_eq!(config.inventory.fallback, FallbackPolicy::First);
        assert_eq!(config.terminal.default_term, "xterm-256color");
        assert_eq!(config.terminal.input_buffer, 128);
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.connection.host_key_policy, HostKeyPolicy::AcceptAny);
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[inventory]
path = "/etc/termhop/servers.json"

[connection]
host_key_policy = "known-hosts"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(
            config.inventory.path,
            PathBuf::from("/etc/termhop/servers.json")
        );
        assert_eq!(config.inventory.fallback, FallbackPolicy::First);
        assert_eq!(config.connection.host_key_policy, HostKeyPolicy::KnownHosts);
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.terminal, TerminalConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[inventory]
path = "servers.json"
fallback = "fail"

[terminal]
default_term = "screen-256color"
input_buffer = 1024

[connection]
connect_timeout_secs = 0
host_key_policy = "accept-new"

[logging]
level = "debug"
file = "/tmp/termhop.log"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.inventory.fallback, FallbackPolicy::Fail);
        assert_eq!(config.terminal.default_term, "screen-256color");
        assert_eq!(config.terminal.input_buffer, 1024);
        assert_eq!(config.connection.host_key_policy, HostKeyPolicy::AcceptNew);
        assert!(config.connection.connect_timeout().is_none());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/termhop.log")));
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("invalid [ toml");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_unknown_policy() {
        let toml = r#"
[connection]
host_key_policy = "trust-me"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut config = Config::default();
        config.inventory.fallback = FallbackPolicy::Fail;
        config.terminal.input_buffer = 4096;
        config.logging.file = Some(PathBuf::from("/var/log/termhop.log"));

        let parsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_connect_timeout() {
        let mut config = ConnectionConfig::default();
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
        config.connect_timeout_secs = 0;
        assert_eq!(config.connect_timeout(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.terminal.default_term = "vt100".to_string();
        config.save(&config_path).unwrap();

        assert!(config_path.exists());
        assert_eq!(Config::load(&config_path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("termhop"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_inventory() {
        std::env::remove_var("TERMHOP_LOG_LEVEL");
        std::env::set_var("TERMHOP_INVENTORY", "/srv/hosts.json");

        let mut config = Config::default();
        let applied = config.apply_env_overrides();
        assert_eq!(config.inventory.path, PathBuf::from("/srv/hosts.json"));
        assert_eq!(
            applied,
            vec![("TERMHOP_INVENTORY", "/srv/hosts.json".to_string())]
        );

        std::env::remove_var("TERMHOP_INVENTORY");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("TERMHOP_INVENTORY", "");
        std::env::set_var("TERMHOP_LOG_LEVEL", "");

        let mut config = Config::default();
        assert!(config.apply_env_overrides().is_empty());
        assert_eq!(config, Config::default());

        std::env::remove_var("TERMHOP_INVENTORY");
        std::env::remove_var("TERMHOP_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("TERMHOP_INVENTORY");
        std::env::set_var("TERMHOP_LOG_LEVEL", "trace");

        let mut config = Config::default();
        let applied = config.apply_env_overrides();
        assert_eq!(config.logging.level, "trace");
        assert_eq!(applied, vec![("TERMHOP_LOG_LEVEL", "trace".to_string())]);

        std::env::remove_var("TERMHOP_LOG_LEVEL");
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_input_buffer_bounds() {
        let mut config = Config::default();
        config.terminal.input_buffer = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidInputBuffer(0)));

        config.terminal.input_buffer = MAX_INPUT_BUFFER + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidInputBuffer(MAX_INPUT_BUFFER + 1))
        );

        config.terminal.input_buffer = MAX_INPUT_BUFFER;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_term() {
        let mut config = Config::default();
        config.terminal.default_term = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyTerm));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }
}
