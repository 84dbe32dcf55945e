//! Demultiplexer for the engine's multiplexed output protocol.
//!
//! Attach, exec and logs endpoints of non-TTY containers interleave stdout
//! and stderr on one connection. Each frame is an 8-byte header followed by
//! the payload:
//!
//! ```text
//! [kind:1][reserved:3][length:4, big-endian] payload...
//! ```
//!
//! [`Demuxer`] turns a [`ByteSource`] into frames one at a time.
//! [`spawn_split`] runs a demuxer on a background task and fans frames out
//! into two bounded channels plus an exit-code future.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::body::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::source::ByteSource;

/// Length of a frame header.
pub const FRAME_HEADER_LEN: usize = 8;

/// Capacity of each output channel of a split stream.
pub const CHANNEL_CAPACITY: usize = 16;

/// Which standard stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
    Stdin,
}

impl StreamKind {
    /// Decode the kind byte of a frame header.
    pub fn from_byte(byte: u8) -> Result<Self, EngineError> {
        match byte {
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            3 => Ok(Self::Stdin),
            other => Err(EngineError::Protocol(format!(
                "invalid stream kind byte {other}"
            ))),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Stdout => 1,
            Self::Stderr => 2,
            Self::Stdin => 3,
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: StreamKind,
    pub payload: Bytes,
}

impl Frame {
    /// Payload as text; invalid UTF-8 is replaced, never rejected.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Encode one frame, header included.
///
/// Payloads longer than `u32::MAX` bytes cannot be framed and are rejected.
pub fn encode_frame(kind: StreamKind, payload: &[u8]) -> Result<Vec<u8>, EngineError> {
    let len = payload_len(payload.len())?;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&[kind.as_byte(), 0, 0, 0]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn payload_len(len: usize) -> Result<u32, EngineError> {
    u32::try_from(len)
        .map_err(|_| EngineError::Protocol(format!("frame payload of {len} bytes exceeds u32")))
}

/// Header plus payload size of a frame, in bytes.
fn frame_size(len: u32) -> Result<usize, EngineError> {
    usize::try_from(len)
        .ok()
        .and_then(|len| FRAME_HEADER_LEN.checked_add(len))
        .ok_or_else(|| {
            EngineError::Protocol(format!("frame length {len} does not fit in memory"))
        })
}

/// Parse a frame header into its kind and payload length.
pub fn parse_header(header: &[u8; FRAME_HEADER_LEN]) -> Result<(StreamKind, u32), EngineError> {
    let kind = StreamKind::from_byte(header[0])?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Ok((kind, len))
}

/// Decode every complete frame in `data`.
///
/// A truncated trailing frame is dropped, matching a stream that closed
/// mid-frame.
pub fn decode_frames(data: &[u8]) -> Result<Vec<Frame>, EngineError> {
    let mut frames = Vec::new();
    let mut rest = data;
    while let Some((header, tail)) = rest.split_first_chunk::<FRAME_HEADER_LEN>() {
        let (kind, len) = parse_header(header)?;
        let len = len as usize;
        if tail.len() < len {
            break;
        }
        frames.push(Frame {
            kind,
            payload: Bytes::copy_from_slice(&tail[..len]),
        });
        rest = &tail[len..];
    }
    Ok(frames)
}

// ── Incremental demuxer ─────────────────────────────────────────────────

/// Frame reader over a live byte source.
///
/// Ends cleanly when the source closes, including when it closes in the
/// middle of a frame. After an error it yields nothing further.
#[derive(Debug)]
pub struct Demuxer<S> {
    source: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S: ByteSource> Demuxer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Next frame, or `None` once the source is exhausted.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, EngineError> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_frame().await;
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    /// Next frame as `(kind, text)`.
    pub async fn next_text(&mut self) -> Result<Option<(StreamKind, String)>, EngineError> {
        Ok(self.next_frame().await?.map(|f| (f.kind, f.text())))
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, EngineError> {
        if !self.fill_to(FRAME_HEADER_LEN).await? {
            if !self.buffer.is_empty() {
                debug!(buffered = self.buffer.len(), "Stream closed inside a frame header");
            }
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buffer[..FRAME_HEADER_LEN]);
        let (kind, len) = parse_header(&header)?;

        let total = frame_size(len)?;
        if !self.fill_to(total).await? {
            debug!(
                expected = len,
                got = self.buffer.len() - FRAME_HEADER_LEN,
                "Stream closed inside a frame payload"
            );
            return Ok(None);
        }
        let payload: Vec<u8> = self.buffer.drain(..total).skip(FRAME_HEADER_LEN).collect();
        trace!(?kind, len, "Frame");
        Ok(Some(Frame {
            kind,
            payload: Bytes::from(payload),
        }))
    }

    /// Buffer at least `n` bytes. `false` if the source closed first.
    async fn fill_to(&mut self, n: usize) -> Result<bool, EngineError> {
        while self.buffer.len() < n {
            match self.source.next_chunk().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}

// ── Split streams ───────────────────────────────────────────────────────

/// Exit code of a streamed exec, resolved once the output has ended.
#[derive(Debug)]
pub struct ExitCode {
    rx: oneshot::Receiver<Result<i64, EngineError>>,
}

impl Future for ExitCode {
    type Output = Result<i64, EngineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| {
                Err(EngineError::Protocol(
                    "output stream task ended without an exit code".to_string(),
                ))
            })
        })
    }
}

/// Independently consumable stdout and stderr plus the exit code.
///
/// Any receiver may be dropped early; the others keep working. Dropping
/// all three stops the background task and closes the connection.
#[derive(Debug)]
pub struct ExecStream {
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
    pub exit_code: ExitCode,
}

/// Demultiplex `source` on a background task.
///
/// Once the stream has ended, `on_end` is awaited to produce the exit code.
/// A stream failure resolves the exit code with that error instead and
/// `on_end` is not called.
pub fn spawn_split<S, F, Fut>(source: S, on_end: F) -> ExecStream
where
    S: ByteSource + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<i64, EngineError>> + Send + 'static,
{
    let (stdout_tx, stdout_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (stderr_tx, stderr_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (mut exit_tx, exit_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut demuxer = Demuxer::new(source);
        let watch_out = stdout_tx.clone();
        let watch_err = stderr_tx.clone();

        let outcome = tokio::select! {
            res = pump(&mut demuxer, stdout_tx, stderr_tx) => Some(res),
            () = async {
                watch_out.closed().await;
                watch_err.closed().await;
                exit_tx.closed().await;
            } => None,
        };
        drop(watch_out);
        drop(watch_err);
        drop(demuxer);

        let exit = match outcome {
            None => {
                debug!("All consumers gone; aborting output stream");
                return;
            }
            Some(Err(e)) => {
                debug!(error = %e, "Output stream failed");
                Err(e)
            }
            Some(Ok(())) if exit_tx.is_closed() => return,
            Some(Ok(())) => on_end().await,
        };
        let _ = exit_tx.send(exit);
    });

    ExecStream {
        stdout: stdout_rx,
        stderr: stderr_rx,
        exit_code: ExitCode { rx: exit_rx },
    }
}

/// Move frames into the channels until the stream ends.
///
/// Waits for capacity only on the channel of the frame in hand. A channel
/// whose receiver is gone is skipped from then on.
async fn pump<S: ByteSource>(
    demuxer: &mut Demuxer<S>,
    stdout: mpsc::Sender<String>,
    stderr: mpsc::Sender<String>,
) -> Result<(), EngineError> {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);
    while let Some(frame) = demuxer.next_frame().await? {
        let slot = match frame.kind {
            StreamKind::Stdout => &mut stdout,
            StreamKind::Stderr => &mut stderr,
            StreamKind::Stdin => {
                trace!("Ignoring stdin frame");
                continue;
            }
        };
        if let Some(tx) = slot {
            if tx.send(frame.text()).await.is_err() {
                debug!(stream = ?frame.kind, "Consumer dropped; discarding its output");
                *slot = None;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn stream(frames: &[(StreamKind, &str)]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(kind, text)| encode_frame(*kind, text.as_bytes()).unwrap())
            .collect()
    }

    #[test]
    fn test_decode_in_order_and_reencode() {
        let input = stream(&[
            (StreamKind::Stdout, "one\n"),
            (StreamKind::Stderr, "two\n"),
            (StreamKind::Stdout, ""),
            (StreamKind::Stdin, "three"),
        ]);
        let frames = decode_frames(&input).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].kind, StreamKind::Stdout);
        assert_eq!(frames[1].text(), "two\n");
        assert_eq!(frames[2].payload.len(), 0);

        let reencoded: Vec<u8> = frames
            .iter()
            .flat_map(|f| encode_frame(f.kind, &f.payload).unwrap())
            .collect();
        assert_eq!(reencoded, input);
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_frame(StreamKind::Stderr, &[0xAA; 258]).unwrap();
        assert_eq!(&bytes[..8], &[2, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(bytes.len(), 8 + 258);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        assert_eq!(payload_len(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            payload_len(u32::MAX as usize + 1),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_frame_size_bounds() {
        assert_eq!(frame_size(0).unwrap(), FRAME_HEADER_LEN);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(frame_size(u32::MAX).unwrap(), FRAME_HEADER_LEN + u32::MAX as usize);
        #[cfg(target_pointer_width = "32")]
        assert!(matches!(frame_size(u32::MAX), Err(EngineError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_demuxer_huge_length_on_closed_stream_ends_cleanly() {
        let input = [1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, b'x'];
        let mut demuxer = Demuxer::new(MemorySource::new(vec![input.to_vec()]));
        let result = demuxer.next_frame().await;
        if cfg!(target_pointer_width = "64") {
            assert!(result.unwrap().is_none());
        } else {
            assert!(matches!(result, Err(EngineError::Protocol(_))));
        }
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let mut input = stream(&[(StreamKind::Stdout, "complete")]);
        input.extend_from_slice(&encode_frame(StreamKind::Stdout, b"partial").unwrap()[..10]);
        let frames = decode_frames(&input).unwrap();
        assert_eq!(frames.len(), 1);

        input.truncate(input.len() - 5);
        assert_eq!(decode_frames(&input).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_kind_bytes() {
        for byte in [0u8, 4, 9, 255] {
            let data = [byte, 0, 0, 0, 0, 0, 0, 1, b'x'];
            let err = decode_frames(&data).unwrap_err();
            assert!(matches!(err, EngineError::Protocol(_)), "byte {byte}");
        }
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let frames = decode_frames(&encode_frame(StreamKind::Stdout, &[b'a', 0xFF, b'b']).unwrap()).unwrap();
        assert_eq!(frames[0].text(), "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn test_demuxer_across_single_byte_chunks() {
        let input = stream(&[
            (StreamKind::Stdout, "hello "),
            (StreamKind::Stderr, "oops"),
            (StreamKind::Stdout, "world"),
        ]);
        let mut demuxer = Demuxer::new(MemorySource::split(&input, 1));
        let mut got = Vec::new();
        while let Some(item) = demuxer.next_text().await.unwrap() {
            got.push(item);
        }
        assert_eq!(
            got,
            vec![
                (StreamKind::Stdout, "hello ".to_string()),
                (StreamKind::Stderr, "oops".to_string()),
                (StreamKind::Stdout, "world".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_demuxer_truncated_payload_ends_cleanly() {
        let mut input = stream(&[(StreamKind::Stdout, "ok")]);
        input.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 50, b'x']);
        let mut demuxer = Demuxer::new(MemorySource::split(&input, 3));
        assert!(demuxer.next_frame().await.unwrap().is_some());
        assert!(demuxer.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_demuxer_stops_after_protocol_error() {
        let mut input = vec![9, 0, 0, 0, 0, 0, 0, 1, b'x'];
        input.extend_from_slice(&stream(&[(StreamKind::Stdout, "after")]));
        let mut demuxer = Demuxer::new(MemorySource::new(vec![input]));
        assert!(matches!(
            demuxer.next_frame().await,
            Err(EngineError::Protocol(_))
        ));
        assert!(demuxer.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_split_abandoned_stdout_still_drains_stderr() {
        let mut frames = Vec::new();
        for i in 0..40 {
            frames.push((StreamKind::Stdout, format!("out {i}")));
            if i % 4 == 0 {
                frames.push((StreamKind::Stderr, format!("err {i}")));
            }
        }
        let input: Vec<u8> = frames
            .iter()
            .flat_map(|(k, t)| encode_frame(*k, t.as_bytes()).unwrap())
            .collect();

        let ExecStream {
            stdout,
            mut stderr,
            exit_code,
        } = spawn_split(MemorySource::split(&input, 7), || async { Ok(3) });
        drop(stdout);

        let mut errs = Vec::new();
        while let Some(line) = stderr.recv().await {
            errs.push(line);
        }
        assert_eq!(errs.len(), 10);
        assert_eq!(errs[9], "err 36");
        assert_eq!(exit_code.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_split_error_resolves_exit_code() {
        let mut input = stream(&[(StreamKind::Stdout, "before")]);
        input.extend_from_slice(&[7, 0, 0, 0, 0, 0, 0, 0]);

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let mut exec = spawn_split(MemorySource::new(vec![input]), move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(0)
        });

        assert_eq!(exec.stdout.recv().await.as_deref(), Some("before"));
        assert!(exec.stdout.recv().await.is_none());
        assert!(matches!(
            exec.exit_code.await,
            Err(EngineError::Protocol(_))
        ));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_split_ignores_stdin_frames() {
        let input = stream(&[
            (StreamKind::Stdin, "typed"),
            (StreamKind::Stdout, "printed"),
        ]);
        let mut exec = spawn_split(MemorySource::new(vec![input]), || async { Ok(0) });
        assert_eq!(exec.stdout.recv().await.as_deref(), Some("printed"));
        assert!(exec.stdout.recv().await.is_none());
        assert!(exec.stderr.recv().await.is_none());
        assert_eq!(exec.exit_code.await.unwrap(), 0);
    }

    /// A source that never produces data and records when it is dropped.
    struct Silent(Arc<AtomicBool>);

    impl ByteSource for Silent {
        fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, EngineError>> {
            Box::pin(std::future::pending())
        }
    }

    impl Drop for Silent {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_every_handle_closes_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let exec = spawn_split(Silent(dropped.clone()), || async { Ok(0) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!dropped.load(Ordering::SeqCst));

        drop(exec);
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
