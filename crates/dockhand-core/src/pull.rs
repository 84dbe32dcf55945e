//! Image-pull progress tracking.
//!
//! `POST /images/create` answers with newline-delimited JSON records, one
//! per progress update, keyed by a `status` string:
//!
//! ```text
//! {"status":"Pulling fs layer","id":"aaa"}
//! {"status":"Downloading","id":"aaa","progressDetail":{"current":50,"total":100}}
//! {"status":"Pull complete","id":"aaa"}
//! ```
//!
//! A pull runs in two phases. While the engine announces layers
//! ([`PullPhase::Discovering`]) ids are only collected. The first record of
//! any other known kind flips the session to [`PullPhase::Reporting`]:
//! observers get the full layer list once, then one progress callback per
//! record, starting with the record that caused the flip.

use hyper::body::Bytes;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::source::ByteSource;

/// Unit reported for extraction progress when the engine omits one.
const DEFAULT_UNIT: &str = "bytes";

/// One decoded progress record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullEvent {
    /// `Pulling fs layer`: a layer the pull will fetch.
    PullingLayer { id: String },
    /// `total` is 0 when the engine does not know the layer size.
    Downloading { id: String, current: u64, total: u64 },
    Extracting { id: String, current: u64, unit: String },
    /// `Pull complete`.
    Complete { id: String },
    /// Any other status, or a record without one.
    Unrecognized { status: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    status: Option<String>,
    id: Option<String>,
    #[serde(rename = "progressDetail")]
    progress_detail: Option<RawProgress>,
    error: Option<String>,
    #[serde(rename = "errorDetail")]
    error_detail: Option<RawErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProgress {
    current: Option<u64>,
    total: Option<u64>,
    units: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawErrorDetail {
    message: Option<String>,
}

impl PullEvent {
    /// Decode one record.
    ///
    /// Unknown statuses decode to [`PullEvent::Unrecognized`]. A known status
    /// missing a field it requires is a protocol error, and an `error`
    /// record fails the pull.
    pub fn parse(line: &str) -> Result<Self, EngineError> {
        let raw: RawEvent = serde_json::from_str(line)
            .map_err(|e| EngineError::Protocol(format!("undecodable pull record: {e}")))?;

        if let Some(error) = raw.error {
            let message = raw.error_detail.and_then(|d| d.message).unwrap_or(error);
            return Err(EngineError::PullFailed(message));
        }

        let Some(status) = raw.status else {
            return Ok(Self::Unrecognized { status: None });
        };
        let require_id = |id: Option<String>| {
            id.ok_or_else(|| EngineError::Protocol(format!("{status:?} record without an id")))
        };
        let require_detail = |detail: Option<RawProgress>| {
            detail.ok_or_else(|| {
                EngineError::Protocol(format!("{status:?} record without progressDetail"))
            })
        };
        let missing = |field: &str| {
            EngineError::Protocol(format!("{status:?} record without progressDetail.{field}"))
        };

        match status.as_str() {
            "Pulling fs layer" => Ok(Self::PullingLayer {
                id: require_id(raw.id)?,
            }),
            "Downloading" => {
                let id = require_id(raw.id)?;
                let detail = require_detail(raw.progress_detail)?;
                Ok(Self::Downloading {
                    id,
                    current: detail.current.ok_or_else(|| missing("current"))?,
                    total: detail.total.unwrap_or(0),
                })
            }
            "Extracting" => {
                let id = require_id(raw.id)?;
                let detail = require_detail(raw.progress_detail)?;
                Ok(Self::Extracting {
                    id,
                    current: detail.current.ok_or_else(|| missing("current"))?,
                    unit: detail.units.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
                })
            }
            "Pull complete" => Ok(Self::Complete {
                id: require_id(raw.id)?,
            }),
            _ => Ok(Self::Unrecognized {
                status: Some(status),
            }),
        }
    }
}

/// Progress of a single layer, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullProgress {
    /// Download in flight.
    Pulling { bytes_total: u64, bytes_pulled: u64 },
    /// Layer fully pulled.
    Downloaded,
    /// Layer being unpacked; `unit` is what `current` counts.
    Extracting { current: u64, unit: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPhase {
    Discovering,
    Reporting,
}

/// Receives pull progress.
pub trait PullObserver {
    /// Called once, when the first non-announcement record arrives, with
    /// every layer id announced so far in first-seen order.
    fn on_layers_discovered(&mut self, _layers: &[String]) {}

    fn on_progress(&mut self, layer: &str, progress: &PullProgress);
}

/// State of one pull.
#[derive(Debug, Clone)]
pub struct PullSession {
    layers: Vec<String>,
    phase: PullPhase,
}

impl Default for PullSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PullSession {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            phase: PullPhase::Discovering,
        }
    }

    /// Layer ids in the order the engine first announced them.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn phase(&self) -> PullPhase {
        self.phase
    }

    /// Apply one event, invoking `observer` as the protocol requires.
    pub fn handle<O: PullObserver + ?Sized>(&mut self, event: PullEvent, observer: &mut O) {
        let (id, progress) = match event {
            PullEvent::Unrecognized { status } => {
                debug!(?status, "Skipping pull record");
                return;
            }
            PullEvent::PullingLayer { id } => {
                if self.phase == PullPhase::Reporting {
                    debug!(id = %id, "Layer announced after progress reporting began");
                }
                if !self.layers.contains(&id) {
                    self.layers.push(id);
                }
                return;
            }
            PullEvent::Downloading { id, current, total } => (
                id,
                PullProgress::Pulling {
                    bytes_total: total,
                    bytes_pulled: current,
                },
            ),
            PullEvent::Extracting { id, current, unit } => {
                (id, PullProgress::Extracting { current, unit })
            }
            PullEvent::Complete { id } => (id, PullProgress::Downloaded),
        };

        if self.phase == PullPhase::Discovering {
            self.phase = PullPhase::Reporting;
            debug!(layers = self.layers.len(), "All layers discovered");
            observer.on_layers_discovered(&self.layers);
        }
        observer.on_progress(&id, &progress);
    }
}

/// Drive `observer` from a pull response body until the body ends.
///
/// If the stream ends while still discovering (every layer was already
/// present, say) no discovery callback fires; the returned session still
/// lists what was announced.
pub async fn track_pull<S, O>(source: S, observer: &mut O) -> Result<PullSession, EngineError>
where
    S: ByteSource,
    O: PullObserver + ?Sized,
{
    let mut session = PullSession::new();
    let mut lines = LineReader::new(source);
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            trace!("Skipping blank pull line");
            continue;
        }
        session.handle(PullEvent::parse(&line)?, observer);
    }
    debug!(phase = ?session.phase, layers = session.layers.len(), "Pull stream ended");
    Ok(session)
}

/// Splits a byte source into `\n`-terminated lines.
struct LineReader<S> {
    source: S,
    buffer: Vec<u8>,
    eof: bool,
}

impl<S: ByteSource> LineReader<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            eof: false,
        }
    }

    /// Next line without its terminator; a final unterminated line counts.
    async fn next_line(&mut self) -> Result<Option<String>, EngineError> {
        loop {
            if let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=i).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }
            match self.source.next_chunk().await? {
                Some(chunk) => self.extend(chunk),
                None => self.eof = true,
            }
        }
    }

    fn extend(&mut self, chunk: Bytes) {
        self.buffer.extend_from_slice(&chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = concat!(
        "{\"status\":\"Pulling fs layer\",\"id\":\"aaa\"}\n",
        "{\"status\":\"Pulling fs layer\",\"id\":\"bbb\"}\n",
        "{\"status\":\"Downloading\",\"id\":\"aaa\",\"progressDetail\":{\"current\":50,\"total\":100}}\n",
        "{\"status\":\"Pull complete\",\"id\":\"aaa\"}\n",
        "{\"status\":\"Downloading\",\"id\":\"bbb\",\"progressDetail\":{\"current\":10,\"total\":20}}\n",
    );

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Discovered(Vec<String>),
        Progress(String, PullProgress),
    }

    #[derive(Default)]
    struct Recorder(Vec<Call>);

    impl PullObserver for Recorder {
        fn on_layers_discovered(&mut self, layers: &[String]) {
            self.0.push(Call::Discovered(layers.to_vec()));
        }

        fn on_progress(&mut self, layer: &str, progress: &PullProgress) {
            self.0.push(Call::Progress(layer.to_string(), progress.clone()));
        }
    }

    fn pulling(total: u64, pulled: u64) -> PullProgress {
        PullProgress::Pulling {
            bytes_total: total,
            bytes_pulled: pulled,
        }
    }

    async fn run(source: MemorySource) -> (Result<PullSession, EngineError>, Vec<Call>) {
        let mut recorder = Recorder::default();
        let result = track_pull(source, &mut recorder).await;
        (result, recorder.0)
    }

    #[tokio::test]
    async fn test_fixture_two_phase_callbacks() {
        let (result, calls) = run(MemorySource::new(vec![FIXTURE])).await;
        let session = result.unwrap();

        assert_eq!(
            calls,
            vec![
                Call::Discovered(vec!["aaa".to_string(), "bbb".to_string()]),
                Call::Progress("aaa".to_string(), pulling(100, 50)),
                Call::Progress("aaa".to_string(), PullProgress::Downloaded),
                Call::Progress("bbb".to_string(), pulling(20, 10)),
            ]
        );
        assert_eq!(session.phase(), PullPhase::Reporting);
        assert_eq!(session.layers(), ["aaa", "bbb"]);
    }

    #[tokio::test]
    async fn test_fixture_split_across_chunks_with_crlf() {
        let crlf = FIXTURE.replace('\n', "\r\n");
        let (result, calls) = run(MemorySource::split(crlf.as_bytes(), 3)).await;
        result.unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0],
            Call::Discovered(vec!["aaa".to_string(), "bbb".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unrecognized_records_do_not_flip_phase() {
        let input = concat!(
            "{\"status\":\"Pulling from library/alpine\",\"id\":\"3.20\"}\n",
            "\n",
            "{\"status\":\"Pulling fs layer\",\"id\":\"aaa\"}\n",
            "{\"status\":\"Waiting\",\"id\":\"aaa\"}\n",
            "{\"id\":\"no-status\"}\n",
            "{\"status\":\"Pulling fs layer\",\"id\":\"aaa\"}\n",
            "{\"status\":\"Pulling fs layer\",\"id\":\"bbb\"}\n",
            "{\"status\":\"Extracting\",\"id\":\"aaa\",\"progressDetail\":{\"current\":7,\"units\":\"s\"}}\n",
            "{\"status\":\"Extracting\",\"id\":\"bbb\",\"progressDetail\":{\"current\":9}}",
        );
        let (result, calls) = run(MemorySource::new(vec![input])).await;
        result.unwrap();
        assert_eq!(
            calls,
            vec![
                Call::Discovered(vec!["aaa".to_string(), "bbb".to_string()]),
                Call::Progress(
                    "aaa".to_string(),
                    PullProgress::Extracting {
                        current: 7,
                        unit: "s".to_string()
                    }
                ),
                Call::Progress(
                    "bbb".to_string(),
                    PullProgress::Extracting {
                        current: 9,
                        unit: "bytes".to_string()
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_ending_while_discovering() {
        let input = "{\"status\":\"Pulling fs layer\",\"id\":\"aaa\"}\n\
                     {\"status\":\"Already exists\",\"id\":\"bbb\"}\n";
        let (result, calls) = run(MemorySource::new(vec![input])).await;
        let session = result.unwrap();
        assert!(calls.is_empty());
        assert_eq!(session.phase(), PullPhase::Discovering);
        assert_eq!(session.layers(), ["aaa"]);
    }

    #[tokio::test]
    async fn test_error_record_fails_pull() {
        let input = concat!(
            "{\"status\":\"Pulling fs layer\",\"id\":\"aaa\"}\n",
            "{\"errorDetail\":{\"message\":\"manifest unknown\"},\"error\":\"manifest unknown\"}\n",
        );
        let (result, _) = run(MemorySource::new(vec![input])).await;
        assert!(matches!(result, Err(EngineError::PullFailed(m)) if m == "manifest unknown"));
    }

    #[test]
    fn test_corrupt_known_record_is_protocol_error() {
        let err = PullEvent::parse(r#"{"status":"Downloading","id":"aaa"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(ref m) if m.contains("progressDetail")));

        let err = PullEvent::parse(r#"{"status":"Downloading","id":"a","progressDetail":{}}"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::Protocol(ref m) if m.contains("current")));

        let err = PullEvent::parse(r#"{"status":"Pull complete"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(ref m) if m.contains("id")));

        let err = PullEvent::parse("not json").unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_download_of_unknown_size_keeps_pulling() {
        let input = concat!(
            "{\"status\":\"Pulling fs layer\",\"id\":\"aaa\"}\n",
            "{\"status\":\"Downloading\",\"id\":\"aaa\",\"progressDetail\":{\"current\":5}}\n",
            "{\"status\":\"Pull complete\",\"id\":\"aaa\"}\n",
        );
        let (result, calls) = run(MemorySource::new(vec![input])).await;
        result.unwrap();
        assert_eq!(
            calls,
            vec![
                Call::Discovered(vec!["aaa".to_string()]),
                Call::Progress("aaa".to_string(), pulling(0, 5)),
                Call::Progress("aaa".to_string(), PullProgress::Downloaded),
            ]
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let event = PullEvent::parse(
            r#"{"status":"Downloading","id":"x","progress":"[=>  ]","progressDetail":{"current":1,"total":2,"hidden":true}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            PullEvent::Downloading {
                id: "x".to_string(),
                current: 1,
                total: 2
            }
        );
    }
}
