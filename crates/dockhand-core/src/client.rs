//! Engine client.
//!
//! [`EngineClient`] is cheap to clone and holds only read-only state: the
//! resolved socket path, API version, timeouts and a credential source.
//! Each call opens a fresh [`Connection`], writes one request and reads one
//! response; nothing is pooled and nothing is retried.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dockhand_config::EngineConfig;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{Containers, Exec, Images, Networks, Volumes};
use crate::auth::{CredentialSource, NoCredentials};
use crate::error::EngineError;
use crate::http::{Endpoint, RawResponse, StreamingResponse, encode_request, read_response};
use crate::socket;
use crate::transport::{Connection, Timeouts};

/// Everything needed to reach the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub socket_path: PathBuf,
    /// Path prefix of every request, e.g. `v1.41`.
    pub api_version: String,
    pub connect_timeout: Duration,
    /// Read timeout for ordinary request/response calls.
    pub request_timeout: Duration,
    /// Read timeout for attach, exec, logs and pull streams.
    pub stream_timeout: Duration,
}

impl ClientOptions {
    /// Options for `socket_path` with default version and timeouts.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_engine_config(socket_path.into(), &EngineConfig::default())
    }

    /// Options from config, resolving the socket path when not configured.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let path = socket::resolve_from_env(config.socket_path.as_deref())?;
        debug!(path = %path.display(), "Resolved engine socket");
        Ok(Self::with_engine_config(path, config))
    }

    fn with_engine_config(socket_path: PathBuf, config: &EngineConfig) -> Self {
        Self {
            socket_path,
            api_version: config.api_version.clone(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            stream_timeout: config.stream_timeout(),
        }
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }
}

/// Client for the engine API.
#[derive(Clone)]
pub struct EngineClient {
    options: Arc<ClientOptions>,
    credentials: Arc<dyn CredentialSource>,
}

impl fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl EngineClient {
    /// Client that pulls anonymously.
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options: Arc::new(options),
            credentials: Arc::new(NoCredentials),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::new(ClientOptions::from_config(config)?))
    }

    /// Use `credentials` for registry authentication on pulls.
    pub fn with_credentials(mut self, credentials: impl CredentialSource + 'static) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn credentials(&self) -> &dyn CredentialSource {
        self.credentials.as_ref()
    }

    // ── Request primitives ──────────────────────────────────────────────

    /// Send `endpoint` and read the full response, whatever its status.
    pub async fn execute(&self, endpoint: &Endpoint) -> Result<RawResponse, EngineError> {
        self.exchange(endpoint, self.options.request_timeout)
            .await?
            .collect()
            .await
    }

    /// Send `endpoint`; non-2xx becomes [`EngineError::RequestFailed`].
    pub async fn send(&self, endpoint: &Endpoint) -> Result<RawResponse, EngineError> {
        self.execute(endpoint).await?.error_for_status()
    }

    /// Send `endpoint` and decode a 2xx JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, EngineError> {
        self.send(endpoint).await?.json()
    }

    /// Send `endpoint` and return the response head with a live body,
    /// whatever its status. Reads use the stream timeout.
    pub async fn open_stream(&self, endpoint: &Endpoint) -> Result<StreamingResponse, EngineError> {
        self.exchange(endpoint, self.options.stream_timeout).await
    }

    /// Like [`open_stream`](Self::open_stream), but non-2xx responses are
    /// collected into [`EngineError::RequestFailed`].
    pub async fn send_streaming(
        &self,
        endpoint: &Endpoint,
    ) -> Result<StreamingResponse, EngineError> {
        self.open_stream(endpoint).await?.error_for_status().await
    }

    async fn exchange(
        &self,
        endpoint: &Endpoint,
        read_timeout: Duration,
    ) -> Result<StreamingResponse, EngineError> {
        let timeouts = Timeouts {
            connect: self.options.connect_timeout,
            read: read_timeout,
        };
        let mut conn = Connection::open(&self.options.socket_path, timeouts).await?;
        debug!(method = %endpoint.method(), path = endpoint.path(), "Engine request");
        conn.write(&encode_request(endpoint, &self.options.api_version))
            .await?;
        read_response(conn).await
    }

    // ── Endpoint groups ─────────────────────────────────────────────────

    pub fn containers(&self) -> Containers<'_> {
        Containers::new(self)
    }

    pub fn exec(&self) -> Exec<'_> {
        Exec::new(self)
    }

    pub fn images(&self) -> Images<'_> {
        Images::new(self)
    }

    pub fn networks(&self) -> Networks<'_> {
        Networks::new(self)
    }

    pub fn volumes(&self) -> Volumes<'_> {
        Volumes::new(self)
    }
}
