//! Pull-based byte sources.
//!
//! The demultiplexer and the pull tracker read response bodies that arrive
//! incrementally and may never end on their own. [`ByteSource`] is the
//! seam between them and the HTTP body reader; [`MemorySource`] replays
//! fixed chunks for tests and fuzzing.

use std::collections::VecDeque;

use hyper::body::Bytes;

use crate::BoxFuture;
use crate::error::EngineError;

/// A live stream of bytes read in arbitrary-sized pieces.
pub trait ByteSource: Send {
    /// Next piece of data, or `None` once the stream has ended.
    ///
    /// Pieces carry no framing meaning; a returned chunk is never empty.
    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, EngineError>>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, EngineError>> {
        (**self).next_chunk()
    }
}

/// In-memory [`ByteSource`] yielding pre-split chunks.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    chunks: VecDeque<Bytes>,
}

impl MemorySource {
    /// Yield `chunks` in order, skipping empty ones.
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks
                .into_iter()
                .map(Into::into)
                .filter(|c: &Bytes| !c.is_empty())
                .collect(),
        }
    }

    /// Split `data` into pieces of at most `size` bytes.
    pub fn split(data: &[u8], size: usize) -> Self {
        Self::new(
            data.chunks(size.max(1))
                .map(Bytes::copy_from_slice)
                .collect::<Vec<_>>(),
        )
    }
}

impl ByteSource for MemorySource {
    fn next_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, EngineError>> {
        let next = self.chunks.pop_front();
        Box::pin(async move { Ok(next) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_skips_empty_chunks() {
        let mut source = MemorySource::new(vec![
            Bytes::from_static(b"ab"),
            Bytes::new(),
            Bytes::from_static(b"c"),
        ]);
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), "ab");
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), "c");
        assert!(source.next_chunk().await.unwrap().is_none());
        assert!(source.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_split() {
        let mut source = MemorySource::split(b"hello", 2);
        let mut pieces = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            pieces.push(chunk);
        }
        assert_eq!(pieces, vec!["he", "ll", "o"]);
    }
}
