//! The engine CLI's credentials file.
//!
//! Registry credentials live in `~/.docker/config.json` under `auths`,
//! keyed by registry host, each holding a pre-encoded `auth` value. A
//! `credsStore` entry names an external helper; it is recorded here but
//! never executed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::ConfigError;

/// Keys the Docker Hub entry may be stored under, in lookup order.
const DOCKER_HUB_ALIASES: [&str; 3] = [
    "docker.io",
    "https://index.docker.io/v1/",
    "index.docker.io",
];

/// Parsed `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsFile {
    /// Name of the external credential helper (`desktop`, `osxkeychain`, ...).
    #[serde(rename = "credsStore", default)]
    pub creds_store: Option<String>,

    /// Per-registry auth entries.
    #[serde(default)]
    pub auths: HashMap<String, AuthEntry>,
}

/// One `auths` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthEntry {
    /// Opaque base64 value forwarded to the engine.
    #[serde(default)]
    pub auth: Option<String>,
}

impl CredentialsFile {
    /// Default location under the given home directory.
    pub fn default_path(home: &Path) -> PathBuf {
        home.join(".docker").join("config.json")
    }

    /// Parse the JSON contents of a credentials file.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load the file at `path`, returning `None` if it does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(&content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No credentials file");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stored auth value for `registry`, if any.
    pub fn auth_for(&self, registry: &str) -> Option<&str> {
        let keys: &[&str] = if DOCKER_HUB_ALIASES.contains(&registry) {
            &DOCKER_HUB_ALIASES
        } else {
            std::slice::from_ref(&registry)
        };
        keys.iter()
            .filter_map(|key| self.auths.get(*key))
            .find_map(|entry| entry.auth.as_deref())
            .filter(|auth| !auth.is_empty())
    }
}
