//! Client configuration.
//!
//! Loaded from a TOML file; every field is optional and falls back to the
//! local development endpoints.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use threadline_core::SyncSettings;

/// Endpoints and tunables for a [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the message store API (default: http://localhost:8000).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Live channel WebSocket URL (default: ws://localhost:8080).
    #[serde(default = "default_live_channel_url")]
    pub live_channel_url: String,
    /// Store request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Live channel connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Window in which identical live messages without a nonce collapse
    /// (default: 2000 ms).
    #[serde(default = "default_dedupe_window_ms")]
    pub dedupe_window_ms: u64,
    /// Maximum sends awaiting their store write (default: 256).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

// Default value functions
fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_live_channel_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_dedupe_window_ms() -> u64 {
    2_000
}

fn default_outbox_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            live_channel_url: default_live_channel_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            dedupe_window_ms: default_dedupe_window_ms(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Store request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Live channel connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Synchronizer settings derived from this configuration.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            dedupe_window_ms: self.dedupe_window_ms,
            outbox_capacity: self.outbox_capacity,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_endpoints() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.live_channel_url, "ws://localhost:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync_settings().dedupe_window_ms, 2_000);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
api_base_url = "https://chat.example.com"
live_channel_url = "wss://chat.example.com/live"
dedupe_window_ms = 500
"#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.api_base_url, "https://chat.example.com");
        assert_eq!(config.live_channel_url, "wss://chat.example.com/live");
        assert_eq!(config.dedupe_window_ms, 500);
        assert_eq!(config.connect_timeout_secs, 30);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::from_file_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn malformed_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "dedupe_window_ms = \"soon\"").unwrap();

        let err = ClientConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
