//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use dockhand_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_path(engine.socket_path())
///     .request_timeout_secs(2)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.engine.socket_path = Some(path.as_ref().display().to_string());
        self
    }

    pub fn api_version(mut self, version: &str) -> Self {
        self.config.engine.api_version = version.to_string();
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine.connect_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine.request_timeout_secs = secs;
        self
    }

    pub fn stream_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine.stream_timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
