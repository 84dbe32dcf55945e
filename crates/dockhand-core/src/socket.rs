//! Engine socket discovery.
//!
//! Resolution order when building a client:
//!
//! 1. `engine.socket_path` from the config file
//! 2. `DOCKER_HOST`, when it names a `unix://` (or `npipe://`) endpoint
//! 3. The first existing path among [`candidate_paths`]
//!
//! Discovery itself is a pure function of the home directory and an
//! existence predicate so it can be tested without touching the host.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// System-wide engine socket.
#[cfg(unix)]
pub const SYSTEM_SOCKET: &str = "/var/run/docker.sock";

/// Default engine named pipe.
#[cfg(windows)]
pub const SYSTEM_SOCKET: &str = r"\\.\pipe\docker_engine";

/// Candidate socket locations in priority order.
///
/// Per-user locations are only included when a home directory is known:
/// Docker Desktop's `~/.docker/run/docker.sock` and Colima's default
/// profile socket.
pub fn candidate_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_SOCKET)];
    #[cfg(unix)]
    if let Some(home) = home {
        paths.push(home.join(".docker").join("run").join("docker.sock"));
        paths.push(home.join(".colima").join("default").join("docker.sock"));
    }
    #[cfg(not(unix))]
    let _ = home;
    paths
}

/// Return the first candidate for which `exists` holds.
pub fn discover(
    home: Option<&Path>,
    exists: impl Fn(&Path) -> bool,
) -> Result<PathBuf, EngineError> {
    let tried = candidate_paths(home);
    match tried.iter().find(|p| exists(p)) {
        Some(found) => Ok(found.clone()),
        None => Err(EngineError::SocketNotFound { tried }),
    }
}

/// Extract a local socket path from a `DOCKER_HOST` value.
///
/// TCP and SSH endpoints are not reachable through this client and yield
/// `None`, falling through to discovery.
pub fn from_docker_host(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    value
        .strip_prefix("unix://")
        .or_else(|| value.strip_prefix("npipe://"))
        .filter(|rest| !rest.is_empty())
        .map(PathBuf::from)
}

/// Resolve the socket path for a client.
///
/// `configured` comes from the config file and `docker_host` from the
/// environment; both are passed in so the caller decides where they come
/// from.
pub fn resolve(
    configured: Option<&str>,
    docker_host: Option<&str>,
    home: Option<&Path>,
) -> Result<PathBuf, EngineError> {
    if let Some(path) = configured {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = docker_host.and_then(from_docker_host) {
        return Ok(path);
    }
    discover(home, |p| p.exists())
}

/// [`resolve`] using `$HOME` and `$DOCKER_HOST` from the process environment.
pub fn resolve_from_env(configured: Option<&str>) -> Result<PathBuf, EngineError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from);
    let docker_host = std::env::var("DOCKER_HOST").ok();
    resolve(configured, docker_host.as_deref(), home.as_deref())
}
