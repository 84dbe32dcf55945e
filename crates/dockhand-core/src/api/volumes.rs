//! Volume endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::client::EngineClient;
use crate::error::EngineError;
use crate::http::Endpoint;

/// A named volume.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Volume {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub created_at: String,
    pub scope: String,
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VolumeList {
    volumes: Option<Vec<Volume>>,
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateVolume<'a> {
    name: &'a str,
    labels: &'a HashMap<String, String>,
}

/// `/volumes` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Volumes<'a> {
    client: &'a EngineClient,
}

impl<'a> Volumes<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Volume>, EngineError> {
        let list: VolumeList = self.client.send_json(&Endpoint::get("/volumes")).await?;
        for warning in list.warnings.iter().flatten() {
            tracing::warn!(warning = %warning, "Engine warning listing volumes");
        }
        Ok(list.volumes.unwrap_or_default())
    }

    /// Create (or return the existing) volume `name`.
    pub async fn create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Volume, EngineError> {
        let endpoint = Endpoint::post("/volumes/create").json(&CreateVolume { name, labels })?;
        self.client.send_json(&endpoint).await
    }

    pub async fn remove(&self, name: &str, force: bool) -> Result<(), EngineError> {
        let mut endpoint = Endpoint::delete(format!("/volumes/{name}"));
        if force {
            endpoint = endpoint.query("force", true);
        }
        self.client.send(&endpoint).await.map(drop)
    }
}
