//! Image endpoints and image-reference parsing.

use std::collections::HashMap;

use hyper::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::REGISTRY_AUTH_HEADER;
use crate::client::EngineClient;
use crate::error::EngineError;
use crate::http::Endpoint;
use crate::pull::{PullObserver, PullSession, track_pull};

/// Registry assumed for references without an explicit host.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed for references without one.
pub const DEFAULT_TAG: &str = "latest";

/// Message the engine sends with a 403 when the registry refuses access.
const ACCESS_FORBIDDEN: &str = "error from registry: access forbidden";

/// An image reference split into registry, repository and tag.
///
/// `alpine` becomes `docker.io`, `library/alpine`, `latest`;
/// `ghcr.io/org/app:1.2` keeps its host in the repository, as the engine
/// expects for `fromImage`. A digest (`name@sha256:...`) takes the place
/// of the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: String,
}

impl ImageReference {
    pub fn parse(image: &str) -> Self {
        let image = image.trim();
        let (name, tag) = match image.split_once('@') {
            Some((name, digest)) => (name, digest),
            None => match image.rfind(':') {
                Some(i) if !image[i..].contains('/') => (&image[..i], &image[i + 1..]),
                _ => (image, DEFAULT_TAG),
            },
        };

        let registry = match name.split_once('/') {
            Some((first, _))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                first.to_string()
            }
            _ => DEFAULT_REGISTRY.to_string(),
        };
        let repository = if name.contains('/') {
            name.to_string()
        } else {
            format!("library/{name}")
        };
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };

        Self {
            registry,
            repository,
            tag: tag.to_string(),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Registry host of `image`.
pub fn registry_from_image(image: &str) -> String {
    ImageReference::parse(image).registry
}

/// Repository of `image` without tag or digest.
pub fn repository_from_image(image: &str) -> String {
    ImageReference::parse(image).repository
}

/// Tag (or digest) of `image`.
pub fn tag_from_image(image: &str) -> String {
    ImageReference::parse(image).tag
}

/// Entry of `GET /images/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Option<Vec<String>>,
    pub repo_digests: Option<Vec<String>>,
    pub created: i64,
    pub size: i64,
    pub labels: Option<HashMap<String, String>>,
}

/// One line of the `DELETE /images/{name}` report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ImageRemoval {
    Untagged(String),
    Deleted(String),
}

/// `/images` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Images<'a> {
    client: &'a EngineClient,
}

impl<'a> Images<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, all: bool) -> Result<Vec<ImageSummary>, EngineError> {
        let mut endpoint = Endpoint::get("/images/json");
        if all {
            endpoint = endpoint.query("all", true);
        }
        self.client.send_json(&endpoint).await
    }

    /// Pull `image`, reporting progress to `observer`.
    ///
    /// Credentials for the image's registry are attached when the client's
    /// credential source has them.
    pub async fn pull<O>(&self, image: &str, observer: &mut O) -> Result<PullSession, EngineError>
    where
        O: PullObserver + ?Sized,
    {
        let reference = ImageReference::parse(image);
        let mut endpoint = Endpoint::post("/images/create")
            .query("fromImage", reference.repository())
            .query("tag", reference.tag());
        match self.client.credentials().registry_auth(reference.registry()) {
            Some(auth) => {
                debug!(registry = reference.registry(), "Attaching registry credentials");
                endpoint = endpoint.header(REGISTRY_AUTH_HEADER, auth.expose());
            }
            None => debug!(registry = reference.registry(), "Pulling anonymously"),
        }

        let response = self.client.open_stream(&endpoint).await?;
        if response.status() == StatusCode::FORBIDDEN {
            let err = response.collect().await?.into_error();
            if err.engine_message().as_deref() == Some(ACCESS_FORBIDDEN) {
                return Err(EngineError::NotAuthorizedForRegistry {
                    registry: reference.registry,
                });
            }
            return Err(err);
        }
        let response = response.error_for_status().await?;

        let session = track_pull(response.into_body(), observer).await?;
        info!(
            image,
            layers = session.layers().len(),
            "Pulled image"
        );
        Ok(session)
    }

    /// Remove `image`. Untagged parents are pruned unless `no_prune`.
    pub async fn remove(
        &self,
        image: &str,
        force: bool,
        no_prune: bool,
    ) -> Result<Vec<ImageRemoval>, EngineError> {
        let endpoint = Endpoint::delete(format!("/images/{image}"))
            .query("force", force)
            .query("noprune", no_prune);
        let response = self.client.execute(&endpoint).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(EngineError::ImageNotFound {
                image: image.to_string(),
            });
        }
        response.error_for_status()?.json()
    }
}
