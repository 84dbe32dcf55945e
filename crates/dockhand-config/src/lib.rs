#![deny(unsafe_code)]

//! Configuration loading and validation for Dockhand.
//!
//! Loads the TOML client configuration ([`AppConfig`]) that tells the engine
//! client where the socket lives, which API version to speak, and how long
//! to wait on each kind of call. The [`credentials`] module reads the
//! engine's own credentials file used for registry authentication.

/// Engine credentials file (`~/.docker/config.json`).
pub mod credentials;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine connection settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to reach the container engine and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit socket (or named pipe) path. When unset the client probes
    /// the well-known locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    /// API version prefix sent on every request (e.g. "v1.41").
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Upper bound on establishing the socket connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Read timeout for short control calls (inspect, create, list, ...).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Read timeout for calls that stream until a remote process finishes
    /// (exec, attach, logs, image pull).
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            api_version: default_api_version(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

fn default_api_version() -> String {
    "v1.41".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_stream_timeout_secs() -> u64 {
    24 * 60 * 60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_api_version(&self.engine.api_version) {
            return Err(ConfigError::Validation(format!(
                "engine.api_version must look like \"v1.41\", got {:?}",
                self.engine.api_version
            )));
        }
        if let Some(path) = &self.engine.socket_path
            && path.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "engine.socket_path must not be empty when set".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout_secs", self.engine.connect_timeout_secs),
            ("request_timeout_secs", self.engine.request_timeout_secs),
            ("stream_timeout_secs", self.engine.stream_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "engine.{name} must be non-zero"
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

/// `v<major>.<minor>` with numeric parts.
fn is_api_version(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('v') else {
        return false;
    };
    let mut parts = rest.split('.');
    let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    [major, minor]
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.engine.socket_path.is_none());
        assert_eq!(config.engine.api_version, "v1.41");
        assert_eq!(config.engine.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.engine.stream_timeout(), Duration::from_secs(86_400));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.engine.request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[engine]
socket_path = "/run/user/1000/docker.sock"
api_version = "v1.43"
connect_timeout_secs = 5
request_timeout_secs = 10
stream_timeout_secs = 600

[logging]
level = "debug"
"#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(
            config.engine.socket_path.as_deref(),
            Some("/run/user/1000/docker.sock")
        );
        assert_eq!(config.engine.api_version, "v1.43");
        assert_eq!(config.engine.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.engine.stream_timeout(), Duration::from_secs(600));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_bad_api_version() {
        for bad in ["1.41", "v1", "v1.x", "v.41", "v1.41.2", ""] {
            let toml = format!("[engine]\napi_version = {bad:?}\n");
            let err = AppConfig::parse(&toml).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation(ref msg) if msg.contains("api_version")),
                "{bad:?} should be rejected, got {err}"
            );
        }
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = AppConfig::parse("[engine]\nrequest_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_rejects_blank_socket_path() {
        let err = AppConfig::parse("[engine]\nsocket_path = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("socket_path"));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let err = AppConfig::parse("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::parse("[engine\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockhand.toml");
        tokio::fs::write(&path, "[engine]\napi_version = \"v1.44\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.engine.api_version, "v1.44");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/dockhand.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
