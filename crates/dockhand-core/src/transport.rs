//! Socket transport: one connection per logical request.
//!
//! A [`Connection`] wraps the raw stream to the engine (a Unix domain
//! socket, or a named pipe on Windows) together with a read buffer and a
//! per-connection read timeout. It is owned by exactly one call and is
//! closed when dropped, so every exit path releases the socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::body::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::EngineError;

/// Size of each socket read.
const READ_CHUNK: usize = 8 * 1024;

/// Any bidirectional byte stream the engine can be reached over.
pub trait EngineIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> EngineIo for T {}

/// Deadlines applied to a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound on establishing the connection.
    pub connect: Duration,
    /// Upper bound on each individual read or write.
    pub read: Duration,
}

/// An open connection to the engine.
pub struct Connection {
    io: Box<dyn EngineIo>,
    path: PathBuf,
    read_timeout: Duration,
    buffer: Vec<u8>,
    eof: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("read_timeout", &self.read_timeout)
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .finish()
    }
}

impl Connection {
    /// Connect to the engine endpoint at `path`.
    pub async fn open(path: &Path, timeouts: Timeouts) -> Result<Self, EngineError> {
        let io = tokio::time::timeout(timeouts.connect, connect_io(path))
            .await
            .map_err(|_| EngineError::Timeout(timeouts.connect))??;
        debug!(path = %path.display(), "Connected to engine");
        Ok(Self::from_io(io, path, timeouts.read))
    }

    /// Wrap an already-connected stream.
    pub fn from_io(io: impl EngineIo + 'static, path: impl Into<PathBuf>, read_timeout: Duration) -> Self {
        Self {
            io: Box::new(io),
            path: path.into(),
            read_timeout,
            buffer: Vec::new(),
            eof: false,
        }
    }

    /// Endpoint this connection was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the peer has closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Write all of `bytes` and flush.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let io = &mut self.io;
        tokio::time::timeout(self.read_timeout, async {
            io.write_all(bytes).await?;
            io.flush().await
        })
        .await
        .map_err(|_| EngineError::Timeout(self.read_timeout))??;
        trace!(bytes = bytes.len(), "Wrote to engine");
        Ok(())
    }

    /// Block until at least `min_bytes` are buffered or the peer closes,
    /// then hand over everything buffered.
    ///
    /// The result is shorter than `min_bytes` only at end of stream; an
    /// empty result means the stream is exhausted.
    pub async fn read_available(&mut self, min_bytes: usize) -> Result<Bytes, EngineError> {
        while self.buffer.len() < min_bytes && !self.eof {
            self.fill().await?;
        }
        Ok(Bytes::from(std::mem::take(&mut self.buffer)))
    }

    /// Close the write side and drop the stream.
    pub async fn close(mut self) {
        if let Err(e) = self.io.shutdown().await {
            trace!(error = %e, "Shutdown on close failed");
        }
    }

    async fn fill(&mut self) -> Result<(), EngineError> {
        self.buffer.reserve(READ_CHUNK);
        let n = tokio::time::timeout(self.read_timeout, self.io.read_buf(&mut self.buffer))
            .await
            .map_err(|_| EngineError::Timeout(self.read_timeout))??;
        if n == 0 {
            trace!(path = %self.path.display(), "Engine closed the connection");
            self.eof = true;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn connect_io(path: &Path) -> Result<Box<dyn EngineIo>, EngineError> {
    let stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(|source| EngineError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn connect_io(path: &Path) -> Result<Box<dyn EngineIo>, EngineError> {
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new()
        .open(path)
        .map_err(|source| EngineError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Box::new(pipe))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn timeouts(read_ms: u64) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(1),
            read: Duration::from_millis(read_ms),
        }
    }

    #[tokio::test]
    async fn test_connect_missing_socket_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");

        let err = Connection::open(&path, timeouts(100)).await.unwrap_err();
        match &err {
            EngineError::Connect { path: p, .. } => assert_eq!(p, &path),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("missing.sock"));
    }

    #[tokio::test]
    async fn test_read_available_waits_for_min_bytes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::from_io(client, "duplex", Duration::from_secs(1));

        let writer = tokio::spawn(async move {
            server.write_all(b"abc").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"defgh").await.unwrap();
            server
        });

        let got = conn.read_available(6).await.unwrap();
        assert_eq!(&got[..], b"abcdefgh");
        drop(writer.await.unwrap());

        let rest = conn.read_available(1).await.unwrap();
        assert!(rest.is_empty());
        assert!(conn.is_eof());
    }

    #[tokio::test]
    async fn test_read_available_short_at_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"xy").await.unwrap();
        drop(server);

        let mut conn = Connection::from_io(client, "duplex", Duration::from_secs(1));
        let got = conn.read_available(8).await.unwrap();
        assert_eq!(&got[..], b"xy");
        assert!(conn.is_eof());
    }

    #[test_log::test(tokio::test)]
    async fn test_read_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(stream);
        });

        let mut conn = Connection::open(&path, timeouts(50)).await.unwrap();
        conn.write(b"GET /_ping HTTP/1.1\r\n\r\n").await.unwrap();
        let err = conn.read_available(1).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(d) if d == Duration::from_millis(50)));
        conn.close().await;

        server.abort();
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut got = Vec::new();
            stream.read_to_end(&mut got).await.unwrap();
            got
        });

        let mut conn = Connection::open(&path, timeouts(1000)).await.unwrap();
        conn.write(b"hello engine").await.unwrap();
        conn.close().await;

        assert_eq!(server.await.unwrap(), b"hello engine");
    }
}
