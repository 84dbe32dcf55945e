//! A scripted fake engine.
//!
//! [`FakeEngine`] listens on a Unix socket in a temporary directory and
//! answers each connection with the [`Reply`] registered for the request's
//! method and path. The API version prefix (`/v1.41`) is stripped before
//! matching. Unmatched requests get a 404 in the engine's error shape.
//! Every request is recorded for later assertions.
//!
//! ```ignore
//! let engine = FakeEngine::start().await;
//! engine.route("GET", "/_ping", Reply::text(200, "OK"));
//! let client = engine.client();
//! assert_eq!(client.ping().await.unwrap(), "OK");
//! assert_eq!(engine.requests()[0].path, "/_ping");
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dockhand_core::demux::{StreamKind, encode_frame};
use dockhand_core::{ClientOptions, EngineClient};
use hyper::StatusCode;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::debug;

/// Pause between pieces of a multi-part reply.
const PIECE_DELAY: Duration = Duration::from_millis(5);

/// What the fake engine sends back.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Write these pieces in order, pausing between them, then close.
    Pieces(Vec<Vec<u8>>),
    /// Accept the request and never answer.
    Hang,
}

impl Reply {
    /// Complete response with a `Content-Length` body.
    pub fn with_body(status: u16, content_type: &str, body: &[u8]) -> Self {
        let mut bytes = head(status, &[
            ("Content-Type", content_type.to_string()),
            ("Content-Length", body.len().to_string()),
        ]);
        bytes.extend_from_slice(body);
        Self::Pieces(vec![bytes])
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::with_body(status, "application/json", body.as_bytes())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::with_body(status, "text/plain; charset=utf-8", body.as_bytes())
    }

    /// Head only, for statuses that carry no body (204, 304).
    pub fn status(status: u16) -> Self {
        Self::Pieces(vec![head(status, &[])])
    }

    /// Chunked body, each chunk sent as a separate write.
    pub fn chunked(status: u16, content_type: &str, chunks: Vec<Vec<u8>>) -> Self {
        let mut pieces = vec![head(status, &[
            ("Content-Type", content_type.to_string()),
            ("Transfer-Encoding", "chunked".to_string()),
        ])];
        for chunk in chunks {
            let mut piece = format!("{:x}\r\n", chunk.len()).into_bytes();
            piece.extend_from_slice(&chunk);
            piece.extend_from_slice(b"\r\n");
            pieces.push(piece);
        }
        pieces.push(b"0\r\n\r\n".to_vec());
        Self::Pieces(pieces)
    }

    /// Body delimited by closing the connection, sent piece by piece.
    pub fn stream(status: u16, content_type: &str, pieces: Vec<Vec<u8>>) -> Self {
        let mut all = vec![head(status, &[("Content-Type", content_type.to_string())])];
        all.extend(pieces);
        Self::Pieces(all)
    }

    /// Newline-delimited JSON pull progress, one chunk per line.
    pub fn pull_progress(lines: &[&str]) -> Self {
        Self::chunked(
            200,
            "application/json",
            lines.iter().map(|l| format!("{l}\r\n").into_bytes()).collect(),
        )
    }

    /// Multiplexed output, one chunk per frame.
    pub fn multiplexed(frames: &[(StreamKind, &str)]) -> Self {
        Self::stream(
            200,
            "application/vnd.docker.multiplexed-stream",
            frames
                .iter()
                .map(|(kind, text)| {
                    encode_frame(*kind, text.as_bytes()).expect("frame payload too large")
                })
                .collect(),
        )
    }
}

fn head(status: u16, headers: &[(&str, String)]) -> Vec<u8> {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut text = format!("HTTP/1.1 {status} {reason}\r\nApi-Version: 1.41\r\nServer: fake-engine\r\n");
    for (name, value) in headers {
        text.push_str(&format!("{name}: {value}\r\n"));
    }
    text.push_str("\r\n");
    text.into_bytes()
}

/// A request the fake engine received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Full request target, version prefix and query included.
    pub target: String,
    /// Path with the version prefix and query removed.
    pub path: String,
    /// Raw query string, without `?`.
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct State {
    routes: Vec<(String, String, Reply)>,
    requests: Vec<RecordedRequest>,
}

/// Scripted engine on a temporary Unix socket.
///
/// The socket and its directory are removed when this value is dropped.
pub struct FakeEngine {
    socket_path: PathBuf,
    state: Arc<Mutex<State>>,
    task: JoinHandle<()>,
    _dir: TempDir,
}

impl FakeEngine {
    pub async fn start() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind fake engine socket");
        let state = Arc::new(Mutex::new(State::default()));

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self {
            socket_path,
            state,
            task,
            _dir: dir,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Answer `method path` with `reply`. Earlier routes win.
    pub fn route(&self, method: &str, path: &str, reply: Reply) -> &Self {
        self.state
            .lock()
            .expect("fake engine state poisoned")
            .routes
            .push((method.to_string(), path.to_string(), reply));
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .expect("fake engine state poisoned")
            .requests
            .clone()
    }

    /// Client options pointing at this engine with short timeouts.
    pub fn options(&self) -> ClientOptions {
        ClientOptions::new(&self.socket_path)
            .request_timeout(Duration::from_secs(5))
            .stream_timeout(Duration::from_secs(5))
    }

    pub fn client(&self) -> EngineClient {
        EngineClient::new(self.options())
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: UnixStream, state: Arc<Mutex<State>>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    debug!(method = %request.method, target = %request.target, "Fake engine request");

    let reply = {
        let mut state = state.lock().expect("fake engine state poisoned");
        let reply = state
            .routes
            .iter()
            .find(|(m, p, _)| *m == request.method && *p == request.path)
            .map(|(_, _, r)| r.clone());
        state.requests.push(request);
        reply
    };
    let reply = reply.unwrap_or_else(|| Reply::json(404, r#"{"message":"page not found"}"#));

    match reply {
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Reply::Pieces(pieces) => {
            let count = pieces.len();
            for (i, piece) in pieces.into_iter().enumerate() {
                if stream.write_all(&piece).await.is_err() {
                    return;
                }
                if i + 1 < count {
                    tokio::time::sleep(PIECE_DELAY).await;
                }
            }
            let _ = stream.shutdown().await;
        }
    }
}

async fn read_request(stream: &mut UnixStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break i;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target.clone(), String::new()),
    };
    Some(RecordedRequest {
        method,
        path: strip_version(&path).to_string(),
        target,
        query,
        headers,
        body,
    })
}

/// `/v1.41/containers/json` → `/containers/json`.
fn strip_version(path: &str) -> &str {
    let Some(rest) = path.strip_prefix("/v") else {
        return path;
    };
    let end = rest.find('/').unwrap_or(rest.len());
    if end > 0 && rest[..end].chars().all(|c| c.is_ascii_digit() || c == '.') {
        &rest[end..]
    } else {
        path
    }
}
