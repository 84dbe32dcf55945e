//! Network endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Created;
use crate::client::EngineClient;
use crate::error::EngineError;
use crate::http::Endpoint;

/// Entry of `GET /networks`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkSummary {
    pub name: String,
    pub id: String,
    pub created: String,
    pub scope: String,
    pub driver: String,
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    pub internal: bool,
    pub attachable: bool,
    pub labels: HashMap<String, String>,
}

/// Body of `POST /networks/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateNetwork {
    pub name: String,
    /// `bridge`, `overlay`, `host`, ...
    pub driver: String,
    pub internal: bool,
    pub attachable: bool,
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    #[serde(rename = "IPAM", skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipam {
    pub driver: String,
    pub config: Vec<IpamPool>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamPool {
    pub subnet: String,
    #[serde(rename = "IPRange", skip_serializing_if = "String::is_empty")]
    pub ip_range: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub gateway: String,
}

impl CreateNetwork {
    /// A bridge network named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            internal: false,
            attachable: false,
            enable_ipv6: false,
            ipam: None,
            labels: HashMap::new(),
        }
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an address pool using the default IPAM driver.
    pub fn subnet(mut self, pool: IpamPool) -> Self {
        self.ipam
            .get_or_insert_with(|| Ipam {
                driver: "default".to_string(),
                config: Vec::new(),
            })
            .config
            .push(pool);
        self
    }
}

/// `/networks` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Networks<'a> {
    client: &'a EngineClient,
}

impl<'a> Networks<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<NetworkSummary>, EngineError> {
        self.client.send_json(&Endpoint::get("/networks")).await
    }

    /// Create a network, returning its id.
    pub async fn create(&self, spec: &CreateNetwork) -> Result<String, EngineError> {
        let endpoint = Endpoint::post("/networks/create").json(spec)?;
        let created: Created = self.client.send_json(&endpoint).await?;
        debug!(id = %created.id, name = %spec.name, "Created network");
        Ok(created.id)
    }

    pub async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .send(&Endpoint::delete(format!("/networks/{id}")))
            .await
            .map(drop)
    }
}
