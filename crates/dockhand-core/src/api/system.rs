//! System endpoints: ping, version and info.

use serde::Deserialize;

use crate::client::EngineClient;
use crate::error::EngineError;
use crate::http::Endpoint;

/// Subset of `GET /version`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersionInfo {
    pub version: String,
    pub api_version: String,
    #[serde(rename = "MinAPIVersion")]
    pub min_api_version: String,
    pub os: String,
    pub arch: String,
    pub kernel_version: String,
    pub go_version: String,
}

/// Subset of `GET /info`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemInfo {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub containers: u64,
    pub containers_running: u64,
    pub containers_paused: u64,
    pub containers_stopped: u64,
    pub images: u64,
    pub server_version: String,
    pub operating_system: String,
    #[serde(rename = "NCPU")]
    pub ncpu: u64,
    pub mem_total: u64,
}

impl EngineClient {
    /// `GET /_ping`; the engine answers `OK`.
    pub async fn ping(&self) -> Result<String, EngineError> {
        let response = self.send(&Endpoint::get("/_ping")).await?;
        Ok(response.text().trim().to_string())
    }

    pub async fn version(&self) -> Result<VersionInfo, EngineError> {
        self.send_json(&Endpoint::get("/version")).await
    }

    pub async fn info(&self) -> Result<SystemInfo, EngineError> {
        self.send_json(&Endpoint::get("/info")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_fields() {
        let v: VersionInfo = serde_json::from_str(
            r#"{"Version":"27.3.1","ApiVersion":"1.47","MinAPIVersion":"1.24","Os":"linux","Arch":"amd64","Components":[]}"#,
        )
        .unwrap();
        assert_eq!(v.version, "27.3.1");
        assert_eq!(v.api_version, "1.47");
        assert_eq!(v.min_api_version, "1.24");
        assert_eq!(v.kernel_version, "");
    }

    #[test]
    fn test_info_fields() {
        let info: SystemInfo = serde_json::from_str(
            r#"{"ID":"abc","Name":"host","Containers":3,"ContainersRunning":1,"NCPU":8,"MemTotal":1024}"#,
        )
        .unwrap();
        assert_eq!(info.containers, 3);
        assert_eq!(info.ncpu, 8);
        assert_eq!(info.images, 0);
    }
}
