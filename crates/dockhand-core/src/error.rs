//! Errors surfaced by the transport, codec, stream parsers and façade.

use std::path::PathBuf;
use std::time::Duration;

use hyper::StatusCode;
use serde::Deserialize;

/// Errors from talking to the container engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to connect to engine socket at {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not find engine socket, tried: {}", display_paths(.tried))]
    SocketNotFound { tried: Vec<PathBuf> },

    #[error("engine did not respond within {0:?}")]
    Timeout(Duration),

    #[error("malformed response from engine: {0}")]
    MalformedResponse(String),

    #[error("engine returned {status}: {body}")]
    RequestFailed { status: StatusCode, body: String },

    #[error("stream protocol error: {0}")]
    Protocol(String),

    #[error("not authorized to pull from registry {registry}")]
    NotAuthorizedForRegistry { registry: String },

    #[error("image {image} not found")]
    ImageNotFound { image: String },

    #[error("container {id} is already running")]
    ContainerAlreadyRunning { id: String },

    #[error("image pull failed: {0}")]
    PullFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The engine's error body shape: `{"message": "..."}`.
#[derive(Debug, Deserialize)]
struct EngineMessage {
    message: String,
}

impl EngineError {
    /// Status code of a [`EngineError::RequestFailed`], if that is what this is.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The engine's `message` field from a failed request body, falling back
    /// to the raw body when it is not the usual JSON shape.
    pub fn engine_message(&self) -> Option<String> {
        match self {
            Self::RequestFailed { body, .. } => Some(
                serde_json::from_str::<EngineMessage>(body)
                    .map(|m| m.message)
                    .unwrap_or_else(|_| body.trim().to_string()),
            ),
            _ => None,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
