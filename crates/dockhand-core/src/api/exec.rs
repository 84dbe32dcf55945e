//! Running commands inside containers.
//!
//! An exec takes three calls: create the exec instance, start it attached
//! (the response body carries multiplexed output until the command exits),
//! then inspect it for the exit code.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Created;
use crate::client::EngineClient;
use crate::demux::{Demuxer, ExecStream, StreamKind, spawn_split};
use crate::error::EngineError;
use crate::http::{Endpoint, ResponseBody};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateExec<'a> {
    attach_stdout: bool,
    attach_stderr: bool,
    cmd: &'a [String],
    env: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartExec {
    detach: bool,
    tty: bool,
}

/// Subset of `GET /exec/{id}/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExecInspect {
    #[serde(rename = "ID")]
    pub id: String,
    pub running: bool,
    /// `None` until the command has exited.
    pub exit_code: Option<i64>,
    #[serde(rename = "ContainerID")]
    pub container_id: String,
}

/// Collected output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// `/exec` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Exec<'a> {
    client: &'a EngineClient,
}

impl<'a> Exec<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    /// Create an exec instance attached to stdout and stderr.
    pub async fn create(
        &self,
        container: &str,
        cmd: &[String],
        env: &[(&str, &str)],
    ) -> Result<String, EngineError> {
        let body = CreateExec {
            attach_stdout: true,
            attach_stderr: true,
            cmd,
            env: env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
        };
        let endpoint = Endpoint::post(format!("/containers/{container}/exec")).json(&body)?;
        let created: Created = self.client.send_json(&endpoint).await?;
        debug!(container, exec = %created.id, "Created exec");
        Ok(created.id)
    }

    pub async fn inspect(&self, exec_id: &str) -> Result<ExecInspect, EngineError> {
        self.client
            .send_json(&Endpoint::get(format!("/exec/{exec_id}/json")))
            .await
    }

    /// Exit code of a finished exec.
    pub async fn exit_code(&self, exec_id: &str) -> Result<i64, EngineError> {
        let inspect = self.inspect(exec_id).await?;
        inspect.exit_code.ok_or_else(|| {
            EngineError::Protocol(format!("exec {exec_id} reported no exit code"))
        })
    }

    /// Run `cmd` to completion and collect its output.
    pub async fn run(
        &self,
        container: &str,
        cmd: &[String],
        env: &[(&str, &str)],
    ) -> Result<ExecResult, EngineError> {
        let exec_id = self.create(container, cmd, env).await?;
        let mut demuxer = Demuxer::new(self.start(&exec_id).await?);

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some((kind, text)) = demuxer.next_text().await? {
            match kind {
                StreamKind::Stdout => stdout.push_str(&text),
                StreamKind::Stderr => stderr.push_str(&text),
                StreamKind::Stdin => {}
            }
        }
        drop(demuxer);

        Ok(ExecResult {
            exit_code: self.exit_code(&exec_id).await?,
            stdout,
            stderr,
        })
    }

    /// Run `cmd`, delivering output as it arrives.
    ///
    /// Failures creating or starting the exec are returned here; anything
    /// after that surfaces on [`ExecStream::exit_code`].
    pub async fn run_streaming(
        &self,
        container: &str,
        cmd: &[String],
        env: &[(&str, &str)],
    ) -> Result<ExecStream, EngineError> {
        let exec_id = self.create(container, cmd, env).await?;
        let body = self.start(&exec_id).await?;
        let client = self.client.clone();
        Ok(spawn_split(body, move || async move {
            client.exec().exit_code(&exec_id).await
        }))
    }

    async fn start(&self, exec_id: &str) -> Result<ResponseBody, EngineError> {
        let endpoint = Endpoint::post(format!("/exec/{exec_id}/start")).json(&StartExec {
            detach: false,
            tty: false,
        })?;
        Ok(self.client.send_streaming(&endpoint).await?.into_body())
    }
}
