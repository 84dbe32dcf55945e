#![deny(unsafe_code)]

//! Dockhand core: a client for the container engine's HTTP API.
//!
//! Every call opens its own connection to the engine's local socket, writes
//! one HTTP/1.1 request and reads the response. Most responses are small
//! JSON documents; three are long-lived streams handled incrementally:
//! multiplexed container output ([`demux`]), newline-delimited pull
//! progress ([`pull`]) and chunked bodies in general ([`http`]).

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, the return type for trait
/// methods used through `dyn Trait`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Typed endpoint groups: containers, exec, images, networks, volumes.
pub mod api;
/// Registry credentials for image pulls.
pub mod auth;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Client entry point tying socket, codec and endpoints together.
pub mod client;
/// Demultiplexer for 8-byte-header container output frames.
pub mod demux;
/// Error type shared by every layer.
pub mod error;
/// HTTP/1.1 request encoder and incremental response decoder.
pub mod http;
/// Image-pull progress tracking.
pub mod pull;
/// Engine socket discovery.
pub mod socket;
/// Pull-based byte sources.
pub mod source;
/// Connections to the engine socket.
pub mod transport;

pub use auth::{CredentialSource, RegistryAuth};
pub use client::{ClientOptions, EngineClient};
pub use demux::{Demuxer, ExecStream, Frame, StreamKind};
pub use error::EngineError;
pub use http::{Endpoint, RawResponse, StreamingResponse};
pub use pull::{PullObserver, PullPhase, PullProgress};
pub use source::ByteSource;
