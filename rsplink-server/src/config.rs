//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RSPLINK_CONFIG or --config)
//! 3. Environment variables

use rsplink_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PACKET_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default TCP port for the stub.
pub const DEFAULT_PORT: u16 = 2345;

/// Smallest packet size worth advertising to a debugger.
pub const MIN_PACKET_SIZE: usize = 64;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Transport configuration.
    pub transport: TransportConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), but an explicit `path` takes precedence
    /// over `RSPLINK_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            config = Self::from_file(path)?;
        } else if let Ok(path) = std::env::var("RSPLINK_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.transport.apply_env_overrides();
    }

    /// Checks values that would make the stub unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.packet_size < MIN_PACKET_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "transport.packet_size must be at least {} (got {})",
                MIN_PACKET_SIZE, self.transport.packet_size
            )));
        }
        if self.transport.max_frame_size < self.transport.packet_size {
            return Err(ConfigError::ValidationError(format!(
                "transport.max_frame_size must be at least packet_size {} (got {})",
                self.transport.packet_size, self.transport.max_frame_size
            )));
        }
        if self.network.accept_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network.accept_poll_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port to listen on (always bound to localhost). 0 picks a free port.
    pub port: u16,
    /// How long one accept attempt waits before re-checking for shutdown.
    pub accept_poll_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            accept_poll_ms: 500,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("RSPLINK_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }

        if let Ok(poll) = std::env::var("RSPLINK_ACCEPT_POLL_MS") {
            if let Ok(ms) = poll.parse() {
                self.accept_poll_ms = ms;
            }
        }
    }

    /// Returns the accept poll interval as Duration.
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes requested per socket read; also advertised as `PacketSize`.
    pub packet_size: usize,
    /// Consecutive framing faults tolerated before the reader gives up.
    pub max_framing_retries: usize,
    /// Largest frame body accepted from the debugger, in wire bytes.
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            max_framing_retries: 16,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TransportConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("RSPLINK_PACKET_SIZE") {
            if let Ok(n) = size.parse() {
                self.packet_size = n;
            }
        }

        if let Ok(retries) = std::env::var("RSPLINK_MAX_FRAMING_RETRIES") {
            if let Ok(n) = retries.parse() {
                self.max_framing_retries = n;
            }
        }

        if let Ok(size) = std::env::var("RSPLINK_MAX_FRAME_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_frame_size = n;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.accept_poll(), Duration::from_millis(500));
        assert_eq!(config.transport.packet_size, 2048);
        assert_eq!(config.transport.max_framing_retries, 16);
        assert_eq!(config.transport.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.port, config.network.port);
        assert_eq!(parsed.transport.packet_size, config.transport.packet_size);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("network:\n  port: 4000\n").unwrap();
        assert_eq!(parsed.network.port, 4000);
        assert_eq!(parsed.network.accept_poll_ms, 500);
        assert_eq!(parsed.transport.packet_size, DEFAULT_PACKET_SIZE);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rsplink.yaml");

        let mut config = Config::default();
        config.network.port = 3333;
        config.transport.max_framing_retries = 4;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.network.port, 3333);
        assert_eq!(loaded.transport.max_framing_retries, 4);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/rsplink.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_, _))));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.transport.packet_size = 8;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("packet_size"));

        let mut config = Config::default();
        config.transport.max_frame_size = 128;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_frame_size"));

        let mut config = Config::default();
        config.network.accept_poll_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
