//! Registry credentials for image pulls.
//!
//! The engine accepts registry credentials as an opaque, pre-encoded
//! `X-Registry-Auth` header value. A [`CredentialSource`] maps a registry
//! host to that value. Where the value comes from (the credentials file, a
//! fixed table in tests) is the source's business; credential helper
//! programs are never run.
//!
//! Values are zeroized on drop and redacted in `Debug` output.

use std::collections::HashMap;
use std::fmt;

use dockhand_config::credentials::CredentialsFile;
use tracing::debug;
use zeroize::Zeroize;

/// Header carrying registry credentials on pull requests.
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// An `X-Registry-Auth` header value.
#[derive(Clone)]
pub struct RegistryAuth {
    inner: String,
}

impl RegistryAuth {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// The header value.
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("inner", &"[REDACTED]")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl Drop for RegistryAuth {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Looks up credentials for a registry host.
pub trait CredentialSource: Send + Sync {
    /// Auth header value for `registry`, or `None` to pull anonymously.
    fn registry_auth(&self, registry: &str) -> Option<RegistryAuth>;
}

/// Always pulls anonymously.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn registry_auth(&self, _registry: &str) -> Option<RegistryAuth> {
        None
    }
}

/// Fixed registry-to-auth table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<String, RegistryAuth>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, registry: impl Into<String>, auth: impl Into<String>) -> Self {
        self.entries.insert(registry.into(), RegistryAuth::new(auth));
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn registry_auth(&self, registry: &str) -> Option<RegistryAuth> {
        self.entries.get(registry).cloned()
    }
}

impl CredentialSource for CredentialsFile {
    fn registry_auth(&self, registry: &str) -> Option<RegistryAuth> {
        let found = self.auth_for(registry).map(RegistryAuth::new);
        if found.is_none() {
            if let Some(store) = &self.creds_store {
                debug!(registry, store = %store, "Credential helpers are not consulted");
            }
        }
        found
    }
}
