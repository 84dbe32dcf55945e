//! Minimal HTTP/1.1 codec for the engine API.
//!
//! Requests are encoded by hand: one request per connection, always with
//! `Connection: close`. Responses are decoded incrementally. The head is
//! parsed as soon as the blank-line terminator arrives, and the body is
//! exposed as a pull-based [`ResponseBody`] that understands
//! `Content-Length`, `Transfer-Encoding: chunked` and close-delimited
//! framing. Attach, logs and pull bodies are unbounded and must never be
//! buffered whole.

use std::borrow::Cow;

use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, HeaderName, HeaderValue, TRANSFER_ENCODING};
use hyper::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::BoxFuture;
use crate::build_info;
use crate::error::EngineError;
use crate::source::ByteSource;
use crate::transport::Connection;

/// Largest response head accepted before giving up on the terminator.
const MAX_HEAD_LEN: usize = 64 * 1024;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_LEN: usize = 4 * 1024;

// ── Requests ────────────────────────────────────────────────────────────

/// One API call: method, path, query, optional JSON body and extra headers.
///
/// Built per call and never mutated once handed to the client.
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Endpoint {
    /// Endpoint for `path`, relative to the API version prefix.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            method,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter only when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add an extra request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, EngineError> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Request target: `/<api-version><path>[?query]`.
    pub fn target(&self, api_version: &str) -> String {
        let version = api_version.trim_matches('/');
        let mut target = if version.is_empty() {
            self.path.clone()
        } else {
            format!("/{version}{}", self.path)
        };
        if !self.query.is_empty() {
            target.push('?');
            target.push_str(
                &url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&self.query)
                    .finish(),
            );
        }
        target
    }
}

/// Serialize `endpoint` as a complete HTTP/1.1 request.
///
/// Always sets `Host`, `User-Agent` and `Connection: close`;
/// `Content-Type` and `Content-Length` only accompany a body.
pub fn encode_request(endpoint: &Endpoint, api_version: &str) -> Vec<u8> {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: {}\r\n",
        endpoint.method,
        endpoint.target(api_version),
        build_info::user_agent()
    );
    if let Some(body) = &endpoint.body {
        head.push_str("Content-Type: application/json\r\n");
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    for (name, value) in &endpoint.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("Connection: close\r\n\r\n");

    let mut bytes = head.into_bytes();
    if let Some(body) = &endpoint.body {
        bytes.extend_from_slice(body);
    }
    bytes
}

// ── Response head ───────────────────────────────────────────────────────

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
    /// Case-insensitive names; a repeated header keeps its last value.
    pub headers: HeaderMap,
}

/// How the body following a response head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body at all.
    Empty,
    /// Exactly this many bytes.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Everything until the engine closes the connection.
    UntilClose,
}

impl ResponseHead {
    /// Header value as text, if present and printable.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body framing implied by the status and headers.
    pub fn framing(&self) -> Result<BodyFraming, EngineError> {
        if self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED
        {
            return Ok(BodyFraming::Empty);
        }
        if let Some(te) = self.headers.get(TRANSFER_ENCODING) {
            let te = te.to_str().unwrap_or_default();
            let last = te.rsplit(',').next().unwrap_or_default().trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
        }
        if let Some(len) = self.headers.get(CONTENT_LENGTH) {
            let len = len
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    EngineError::MalformedResponse(format!("invalid Content-Length: {len:?}"))
                })?;
            return Ok(if len == 0 {
                BodyFraming::Empty
            } else {
                BodyFraming::Length(len)
            });
        }
        Ok(BodyFraming::UntilClose)
    }
}

/// Parse a response head from the start of `buf`.
///
/// Returns `Ok(None)` while the `\r\n\r\n` terminator has not arrived,
/// otherwise the head and the number of bytes it occupied (terminator
/// included). Whatever follows belongs to the body.
pub fn decode_response_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, EngineError> {
    let Some(end) = find(buf, b"\r\n\r\n") else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&buf[..end]);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts
        .next()
        .filter(|v| v.starts_with("HTTP/"))
        .ok_or_else(|| {
            EngineError::MalformedResponse(format!("invalid status line: {status_line:?}"))
        })?;
    let code = parts.next().unwrap_or_default();
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| EngineError::MalformedResponse(format!("invalid status code: {code:?}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = HeaderMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            trace!(line, "Skipping header line without a colon");
            continue;
        };
        match (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => trace!(line, "Skipping unparsable header"),
        }
    }

    Ok(Some((
        ResponseHead {
            version: version.to_string(),
            status,
            reason,
            headers,
        },
        end + 4,
    )))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── Response body ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Length { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkEnd,
    Trailer,
    UntilClose,
    Done,
}

/// Pull-based reader over a response body.
///
/// Owns the connection; dropping the body closes the socket. A stream that
/// ends early (peer closed inside a declared length or chunk) simply ends;
/// consumers decide whether the data they got is complete.
#[derive(Debug)]
pub struct ResponseBody {
    conn: Connection,
    pending: Vec<u8>,
    state: BodyState,
}

impl ResponseBody {
    fn new(conn: Connection, leftover: Vec<u8>, framing: BodyFraming) -> Self {
        let state = match framing {
            BodyFraming::Empty => BodyState::Done,
            BodyFraming::Length(remaining) => BodyState::Length { remaining },
            BodyFraming::Chunked => BodyState::ChunkSize,
            BodyFraming::UntilClose => BodyState::UntilClose,
        };
        Self {
            conn,
            pending: leftover,
            state,
        }
    }

    /// Next piece of body data, or `None` at the end of the body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, EngineError> {
        loop {
            match self.state {
                BodyState::Done => return Ok(None),

                BodyState::UntilClose => {
                    if self.pending.is_empty() && !self.fill().await? {
                        self.state = BodyState::Done;
                        return Ok(None);
                    }
                    return Ok(Some(self.take(self.pending.len())));
                }

                BodyState::Length { remaining: 0 } => self.state = BodyState::Done,
                BodyState::Length { remaining } => {
                    if self.pending.is_empty() && !self.fill().await? {
                        return Ok(self.truncated(remaining));
                    }
                    let n = clamp(remaining, self.pending.len());
                    self.state = BodyState::Length {
                        remaining: remaining - n as u64,
                    };
                    return Ok(Some(self.take(n)));
                }

                BodyState::ChunkSize => {
                    let Some(line) = self.line().await? else {
                        return Ok(self.truncated(0));
                    };
                    let size = parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        BodyState::Trailer
                    } else {
                        BodyState::ChunkData { remaining: size }
                    };
                }
                BodyState::ChunkData { remaining } => {
                    if self.pending.is_empty() && !self.fill().await? {
                        return Ok(self.truncated(remaining));
                    }
                    let n = clamp(remaining, self.pending.len());
                    let left = remaining - n as u64;
                    self.state = if left == 0 {
                        BodyState::ChunkEnd
                    } else {
                        BodyState::ChunkData { remaining: left }
                    };
                    return Ok(Some(self.take(n)));
                }
                BodyState::ChunkEnd => {
                    let Some(line) = self.line().await? else {
                        return Ok(self.truncated(0));
                    };
                    if !line.is_empty() {
                        return Err(EngineError::MalformedResponse(
                            "missing CRLF after chunk data".to_string(),
                        ));
                    }
                    self.state = BodyState::ChunkSize;
                }
                BodyState::Trailer => match self.line().await? {
                    Some(line) if line.is_empty() => self.state = BodyState::Done,
                    Some(_) => {}
                    None => self.state = BodyState::Done,
                },
            }
        }
    }

    /// Read the whole remaining body into memory.
    pub async fn collect(mut self) -> Result<Bytes, EngineError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }

    async fn fill(&mut self) -> Result<bool, EngineError> {
        let more = self.conn.read_available(1).await?;
        if more.is_empty() {
            return Ok(false);
        }
        self.pending.extend_from_slice(&more);
        Ok(true)
    }

    fn take(&mut self, n: usize) -> Bytes {
        if n == self.pending.len() {
            Bytes::from(std::mem::take(&mut self.pending))
        } else {
            Bytes::from(self.pending.drain(..n).collect::<Vec<u8>>())
        }
    }

    /// Next CRLF-terminated line, without the terminator. `None` at EOF.
    async fn line(&mut self) -> Result<Option<Vec<u8>>, EngineError> {
        loop {
            if let Some(i) = find(&self.pending, b"\r\n") {
                let line = self.pending[..i].to_vec();
                self.pending.drain(..i + 2);
                return Ok(Some(line));
            }
            if self.pending.len() > MAX_LINE_LEN {
                return Err(EngineError::MalformedResponse(
                    "chunked framing line too long".to_string(),
                ));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    fn truncated(&mut self, missing: u64) -> Option<Bytes> {
        debug!(
            missing,
            path = %self.conn.path().display(),
            "Engine closed the connection before the body was complete"
        );
        self.state = BodyState::Done;
        None
    }
}

impl ByteSource for ResponseBody {
    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, EngineError>> {
        Box::pin(self.chunk())
    }
}

fn clamp(remaining: u64, available: usize) -> usize {
    usize::try_from(remaining).map_or(available, |r| r.min(available))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, EngineError> {
    let text = String::from_utf8_lossy(line);
    let size = text.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16)
        .map_err(|_| EngineError::MalformedResponse(format!("invalid chunk size: {size:?}")))
}

// ── Responses ───────────────────────────────────────────────────────────

/// Response whose body is still on the wire.
#[derive(Debug)]
pub struct StreamingResponse {
    head: ResponseHead,
    body: ResponseBody,
}

impl StreamingResponse {
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// The live body, for streaming consumers.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Read the body to the end.
    pub async fn collect(self) -> Result<RawResponse, EngineError> {
        let body = self.body.collect().await?;
        Ok(RawResponse {
            status: self.head.status,
            headers: self.head.headers,
            body,
        })
    }

    /// Pass 2xx responses through; collect anything else into
    /// [`EngineError::RequestFailed`].
    pub async fn error_for_status(self) -> Result<Self, EngineError> {
        if self.head.status.is_success() {
            return Ok(self);
        }
        Err(self.collect().await?.into_error())
    }
}

/// Fully materialized response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Convert into [`EngineError::RequestFailed`] regardless of status.
    pub fn into_error(self) -> EngineError {
        EngineError::RequestFailed {
            status: self.status,
            body: self.text().into_owned(),
        }
    }

    /// Pass 2xx responses through, fail everything else.
    pub fn error_for_status(self) -> Result<Self, EngineError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }
}

/// Read a response head from `conn` and wrap the rest as a streaming body.
pub async fn read_response(mut conn: Connection) -> Result<StreamingResponse, EngineError> {
    let mut buf = Vec::new();
    loop {
        if let Some((head, len)) = decode_response_head(&buf)? {
            let leftover = buf.split_off(len);
            let framing = head.framing()?;
            debug!(status = %head.status, ?framing, "Engine response");
            let body = ResponseBody::new(conn, leftover, framing);
            return Ok(StreamingResponse { head, body });
        }
        if buf.len() > MAX_HEAD_LEN {
            return Err(EngineError::MalformedResponse(format!(
                "response head exceeds {MAX_HEAD_LEN} bytes"
            )));
        }
        let more = conn.read_available(1).await?;
        if more.is_empty() {
            return Err(EngineError::MalformedResponse(if buf.is_empty() {
                "empty response from engine".to_string()
            } else {
                "connection closed inside the response head".to_string()
            }));
        }
        buf.extend_from_slice(&more);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn request_text(endpoint: &Endpoint) -> String {
        String::from_utf8(encode_request(endpoint, "v1.41")).unwrap()
    }

    /// Connection whose peer writes `pieces` one by one, then closes.
    fn scripted(pieces: &[&'static [u8]]) -> Connection {
        let (client, mut server) = tokio::io::duplex(1024);
        let pieces = pieces.to_vec();
        tokio::spawn(async move {
            for piece in pieces {
                server.write_all(piece).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });
        Connection::from_io(client, "scripted", Duration::from_secs(2))
    }

    #[test]
    fn test_encode_get_without_body() {
        let text = request_text(&Endpoint::get("/containers/json").query("all", true));
        let ua = build_info::user_agent();
        assert_eq!(
            text,
            format!(
                "GET /v1.41/containers/json?all=true HTTP/1.1\r\n\
                 Host: localhost\r\n\
                 User-Agent: {ua}\r\n\
                 Connection: close\r\n\r\n"
            )
        );
        assert!(!text.contains("Content-Length"));
        assert!(!text.contains("Content-Type"));
    }

    #[test]
    fn test_encode_post_with_body_and_header() {
        let endpoint = Endpoint::post("images/create")
            .query("fromImage", "library/alpine")
            .query("tag", "3.20")
            .header("X-Registry-Auth", "abc=")
            .json(&serde_json::json!({"a": 1}))
            .unwrap();
        let text = request_text(&endpoint);

        assert!(text.starts_with(
            "POST /v1.41/images/create?fromImage=library%2Falpine&tag=3.20 HTTP/1.1\r\n"
        ));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.contains("X-Registry-Auth: abc=\r\n"));
        assert!(text.contains("Connection: close\r\n\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"a\":1}"));
    }

    #[test]
    fn test_target_without_version() {
        assert_eq!(Endpoint::get("_ping").target(""), "/_ping");
        assert_eq!(Endpoint::get("/_ping").target("/v1.44/"), "/v1.44/_ping");
    }

    #[test]
    fn test_query_opt() {
        let endpoint = Endpoint::get("/x")
            .query_opt("a", Some(1))
            .query_opt("b", None::<u8>);
        assert_eq!(endpoint.target("v1.41"), "/v1.41/x?a=1");
    }

    #[test]
    fn test_decode_head() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nAPI-Version: 1.41\r\n\r\n{}";
        let (head, len) = decode_response_head(raw).unwrap().unwrap();
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.header("content-type"), Some("application/json"));
        assert_eq!(head.header("Api-Version"), Some("1.41"));
        assert_eq!(&raw[len..], b"{}");
    }

    #[test]
    fn test_decode_head_needs_more() {
        assert!(
            decode_response_head(b"HTTP/1.1 200 OK\r\nServer: x\r\n")
                .unwrap()
                .is_none()
        );
        assert!(decode_response_head(b"").unwrap().is_none());
    }

    #[test]
    fn test_decode_head_last_value_wins() {
        let raw = b"HTTP/1.1 200 OK\r\nX-Thing: one\r\nx-thing: two\r\nnot a header\r\n\r\n";
        let (head, _) = decode_response_head(raw).unwrap().unwrap();
        assert_eq!(head.header("X-THING"), Some("two"));
        assert_eq!(head.headers.len(), 1);
    }

    #[test]
    fn test_decode_head_bad_status_code() {
        let err = decode_response_head(b"HTTP/1.1 abc Weird\r\n\r\n").unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(ref m) if m.contains("abc")));

        let err = decode_response_head(b"garbage\r\n\r\n").unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }

    #[test]
    fn test_decode_head_without_reason() {
        let (head, _) = decode_response_head(b"HTTP/1.1 204\r\n\r\n").unwrap().unwrap();
        assert_eq!(head.status, StatusCode::NO_CONTENT);
        assert_eq!(head.reason, "");
        assert_eq!(head.framing().unwrap(), BodyFraming::Empty);
    }

    #[test]
    fn test_framing_selection() {
        let framing = |raw: &[u8]| {
            decode_response_head(raw)
                .unwrap()
                .unwrap()
                .0
                .framing()
        };
        assert_eq!(
            framing(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n").unwrap(),
            BodyFraming::Length(12)
        );
        assert_eq!(
            framing(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n")
                .unwrap(),
            BodyFraming::Chunked
        );
        assert_eq!(
            framing(b"HTTP/1.1 200 OK\r\nContent-Type: application/vnd.docker.raw-stream\r\n\r\n")
                .unwrap(),
            BodyFraming::UntilClose
        );
        assert_eq!(
            framing(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n").unwrap(),
            BodyFraming::Empty
        );
        assert!(framing(b"HTTP/1.1 200 OK\r\nContent-Length: lots\r\n\r\n").is_err());
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let conn = scripted(&[
            b"HTTP/1.1 200 OK\r\nContent-Le",
            b"ngth: 11\r\n\r\nhello",
            b" world and trailing junk",
        ]);
        let resp = read_response(conn).await.unwrap().collect().await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.text(), "hello world");
    }

    #[tokio::test]
    async fn test_chunked_body_across_reads() {
        let conn = scripted(&[
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel",
            b"lo\r\n",
            b"6;ext=1\r\n worl",
            b"d\r\n0\r\nX-Trailer: y\r\n\r\n",
        ]);
        let resp = read_response(conn).await.unwrap();
        let mut body = resp.into_body();
        let mut pieces = Vec::new();
        while let Some(chunk) = body.chunk().await.unwrap() {
            pieces.push(String::from_utf8(chunk.to_vec()).unwrap());
        }
        assert_eq!(pieces.concat(), "hello world");
        assert!(pieces.len() >= 2);
    }

    #[tokio::test]
    async fn test_until_close_body() {
        let conn = scripted(&[b"HTTP/1.1 200 OK\r\n\r\nab", b"cd"]);
        let resp = read_response(conn).await.unwrap().collect().await.unwrap();
        assert_eq!(&resp.body[..], b"abcd");
    }

    #[tokio::test]
    async fn test_truncated_chunked_body_ends_quietly() {
        let conn = scripted(&[
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\na\r\nabc",
        ]);
        let resp = read_response(conn).await.unwrap().collect().await.unwrap();
        assert_eq!(&resp.body[..], b"abc");
    }

    #[tokio::test]
    async fn test_invalid_chunk_size() {
        let conn = scripted(&[
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nabc\r\n",
        ]);
        let err = read_response(conn).await.unwrap().collect().await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(ref m) if m.contains("chunk size")));
    }

    #[tokio::test]
    async fn test_empty_response() {
        let conn = scripted(&[]);
        let err = read_response(conn).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(ref m) if m.contains("empty")));
    }

    #[tokio::test]
    async fn test_closed_inside_head() {
        let conn = scripted(&[b"HTTP/1.1 200 OK\r\nServer"]);
        let err = read_response(conn).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(ref m) if m.contains("head")));
    }

    #[tokio::test]
    async fn test_error_for_status_collects_body() {
        let conn = scripted(&[
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 30\r\n\r\n{\"message\":\"No such image: x\"}",
        ]);
        let err = read_response(conn)
            .await
            .unwrap()
            .error_for_status()
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.engine_message().as_deref(), Some("No such image: x"));
    }
}
