//! Byte sources feeding the split pipeline.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::SplitError;

/// Produces the source as a sequence of chunks.
///
/// `next_chunk` resolves to `Ok(None)` once the source is exhausted and
/// must keep doing so on further calls. Chunks may be any non-empty size
/// and need not end on a line boundary.
pub trait ByteSource: Send {
    fn next_chunk(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, SplitError>> + Send + '_>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// File source
// ─────────────────────────────────────────────────────────────────────────────

/// Reads a file in chunks of at most `max_store` bytes.
pub struct FileSource {
    file: File,
    path: PathBuf,
    max_store: usize,
    done: bool,
}

impl FileSource {
    /// Opens `path` for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::SourceUnavailable` if the file cannot be opened.
    pub async fn open(path: &Path, max_store: usize) -> Result<Self, SplitError> {
        let file = File::open(path).await.map_err(|e| {
            SplitError::SourceUnavailable(format!(
                "Failed to open source file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            max_store: max_store.max(1),
            done: false,
        })
    }

    async fn read_next(&mut self) -> Result<Option<Bytes>, SplitError> {
        if self.done {
            return Ok(None);
        }

        let mut buf = BytesMut::zeroed(self.max_store);
        let n = self.file.read(&mut buf).await.map_err(|e| {
            SplitError::SourceUnavailable(format!(
                "Failed to read source file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if n == 0 {
            self.done = true;
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf.freeze()))
    }
}

impl ByteSource for FileSource {
    fn next_chunk(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, SplitError>> + Send + '_>> {
        Box::pin(self.read_next())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory source
// ─────────────────────────────────────────────────────────────────────────────

/// Replays a fixed list of chunks. Empty chunks are skipped.
#[derive(Debug, Clone, Default)]
pub struct ChunkedSource {
    chunks: VecDeque<Bytes>,
}

impl ChunkedSource {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks
                .into_iter()
                .map(Into::into)
                .filter(|chunk: &Bytes| !chunk.is_empty())
                .collect(),
        }
    }

    /// Cuts `data` into chunks of `chunk_size` bytes (the last may be shorter).
    pub fn with_chunk_size(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let data: Bytes = data.into();
        let chunk_size = chunk_size.max(1);
        let chunks = (0..data.len())
            .step_by(chunk_size)
            .map(|start| data.slice(start..(start + chunk_size).min(data.len())));
        Self::new(chunks)
    }

    /// Number of chunks not yet produced.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl ByteSource for ChunkedSource {
    fn next_chunk(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, SplitError>> + Send + '_>> {
        let next = self.chunks.pop_front();
        Box::pin(async move { Ok(next) })
    }
}
