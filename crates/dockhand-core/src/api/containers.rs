//! Container endpoints.

use std::collections::HashMap;

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Created;
use crate::client::EngineClient;
use crate::demux::Demuxer;
use crate::error::EngineError;
use crate::http::{Endpoint, ResponseBody};

/// Entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    #[serde(rename = "ImageID")]
    pub image_id: String,
    pub command: String,
    pub created: i64,
    /// `created`, `running`, `paused`, `exited`, ...
    pub state: String,
    /// Human-readable status, e.g. `Up 2 minutes`.
    pub status: String,
    pub labels: HashMap<String, String>,
}

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainer {
    /// Sent as the `name` query parameter, not in the body.
    #[serde(skip)]
    pub name: Option<String>,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Keys like `80/tcp`; values are always empty objects.
    pub exposed_ports: HashMap<String, EmptyObject>,
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// `source:target[:ro]` bind and volume mounts.
    pub binds: Vec<String>,
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

impl CreateContainer {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Mount `source` (host path or volume name) at `target`.
    pub fn bind(mut self, source: &str, target: &str, read_only: bool) -> Self {
        let mut bind = format!("{source}:{target}");
        if read_only {
            bind.push_str(":ro");
        }
        self.host_config.binds.push(bind);
        self
    }

    /// Publish container `port/protocol` on `host_port`.
    pub fn publish(mut self, port: u16, protocol: &str, host_port: u16) -> Self {
        let key = format!("{port}/{}", protocol.to_ascii_lowercase());
        self.exposed_ports.insert(key.clone(), EmptyObject {});
        self.host_config.port_bindings.insert(
            key,
            vec![PortBinding {
                host_ip: String::new(),
                host_port: host_port.to_string(),
            }],
        );
        self
    }
}

/// Subset of `GET /containers/{id}/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerInspect {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    #[serde(rename = "OOMKilled")]
    pub oom_killed: bool,
    pub dead: bool,
    pub exit_code: i64,
    pub error: String,
    pub started_at: String,
    pub finished_at: String,
}

/// Result of starting a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The engine reported no state change.
    AlreadyRunning,
}

/// `/containers` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Containers<'a> {
    client: &'a EngineClient,
}

impl<'a> Containers<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        let mut endpoint = Endpoint::get("/containers/json");
        if all {
            endpoint = endpoint.query("all", true);
        }
        self.client.send_json(&endpoint).await
    }

    /// Create a container, returning its id.
    ///
    /// A 404 means the image is not present locally.
    pub async fn create(&self, spec: &CreateContainer) -> Result<String, EngineError> {
        let endpoint = Endpoint::post("/containers/create")
            .query_opt("name", spec.name.as_deref())
            .json(spec)?;
        let response = self.client.execute(&endpoint).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(EngineError::ImageNotFound {
                image: spec.image.clone(),
            });
        }
        let created: Created = response.error_for_status()?.json()?;
        created.log_warnings("container");
        debug!(id = %created.id, image = %spec.image, "Created container");
        Ok(created.id)
    }

    /// Start a container. Starting a running one is not an error.
    pub async fn start(&self, id: &str) -> Result<StartOutcome, EngineError> {
        let endpoint = Endpoint::post(format!("/containers/{id}/start"));
        let response = self.client.execute(&endpoint).await?;
        if response.status == StatusCode::NOT_MODIFIED {
            debug!(id, "Container already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        response.error_for_status()?;
        Ok(StartOutcome::Started)
    }

    /// Start a container, failing if it was already running.
    pub async fn start_strict(&self, id: &str) -> Result<(), EngineError> {
        match self.start(id).await? {
            StartOutcome::Started => Ok(()),
            StartOutcome::AlreadyRunning => Err(EngineError::ContainerAlreadyRunning {
                id: id.to_string(),
            }),
        }
    }

    /// Stop a container; stopping a stopped one succeeds.
    pub async fn stop(&self, id: &str, timeout_secs: Option<u32>) -> Result<(), EngineError> {
        let endpoint = Endpoint::post(format!("/containers/{id}/stop")).query_opt("t", timeout_secs);
        self.unless_not_modified(&endpoint).await
    }

    pub async fn restart(&self, id: &str, timeout_secs: Option<u32>) -> Result<(), EngineError> {
        let endpoint =
            Endpoint::post(format!("/containers/{id}/restart")).query_opt("t", timeout_secs);
        self.client.send(&endpoint).await.map(drop)
    }

    /// Send `signal` (default `SIGKILL`).
    pub async fn kill(&self, id: &str, signal: Option<&str>) -> Result<(), EngineError> {
        let endpoint = Endpoint::post(format!("/containers/{id}/kill")).query_opt("signal", signal);
        self.client.send(&endpoint).await.map(drop)
    }

    pub async fn pause(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .send(&Endpoint::post(format!("/containers/{id}/pause")))
            .await
            .map(drop)
    }

    pub async fn unpause(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .send(&Endpoint::post(format!("/containers/{id}/unpause")))
            .await
            .map(drop)
    }

    /// Remove a container, killing it first when `force` is set.
    pub async fn remove(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut endpoint = Endpoint::delete(format!("/containers/{id}"));
        if force {
            endpoint = endpoint.query("force", true);
        }
        self.client.send(&endpoint).await.map(drop)
    }

    pub async fn inspect(&self, id: &str) -> Result<ContainerInspect, EngineError> {
        self.client
            .send_json(&Endpoint::get(format!("/containers/{id}/json")))
            .await
    }

    /// Container output as multiplexed frames.
    ///
    /// With `follow` the stream stays open while the container runs.
    /// Containers started with a TTY produce raw output instead of frames and
    /// are not supported here.
    pub async fn logs(
        &self,
        id: &str,
        follow: bool,
        tail: Option<u32>,
    ) -> Result<Demuxer<ResponseBody>, EngineError> {
        let endpoint = Endpoint::get(format!("/containers/{id}/logs"))
            .query("stdout", true)
            .query("stderr", true)
            .query("follow", follow)
            .query_opt("tail", tail);
        let response = self.client.send_streaming(&endpoint).await?;
        Ok(Demuxer::new(response.into_body()))
    }

    async fn unless_not_modified(&self, endpoint: &Endpoint) -> Result<(), EngineError> {
        let response = self.client.execute(endpoint).await?;
        if response.status != StatusCode::NOT_MODIFIED {
            response.error_for_status()?;
        }
        Ok(())
    }
}
