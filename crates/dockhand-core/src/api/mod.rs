//! Typed endpoint groups.
//!
//! Each group borrows the [`EngineClient`](crate::EngineClient) and turns
//! method calls into [`Endpoint`](crate::Endpoint)s, interpreting the few
//! status codes that carry meaning for that endpoint. Response types keep
//! the fields callers use and ignore the rest.

pub mod containers;
pub mod exec;
pub mod images;
pub mod networks;
pub mod system;
pub mod volumes;

pub use containers::{ContainerInspect, ContainerSummary, Containers, CreateContainer, StartOutcome};
pub use exec::{Exec, ExecInspect, ExecResult};
pub use images::{ImageReference, ImageRemoval, ImageSummary, Images};
pub use networks::{CreateNetwork, NetworkSummary, Networks};
pub use system::{SystemInfo, VersionInfo};
pub use volumes::{Volume, Volumes};

use serde::Deserialize;

/// `{"Id": "..."}` body returned by create endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Warnings", default)]
    pub warnings: Option<Vec<String>>,
}

impl Created {
    pub(crate) fn log_warnings(&self, what: &str) {
        for warning in self.warnings.iter().flatten() {
            tracing::warn!(id = %self.id, what, warning = %warning, "Engine warning");
        }
    }
}
