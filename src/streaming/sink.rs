//! Output sinks for shards.
//!
//! A [`ShardFactory`] creates one [`ByteSink`] per shard. Writes resolve
//! only once the bytes have been handed to the underlying storage, so a
//! completed write is safe to count.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::SplitError;

/// Accepts the bytes of one shard.
pub trait ByteSink: Send {
    /// Appends `bytes` to the shard.
    fn write<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), SplitError>> + Send + 'a>>;

    /// Flushes and closes the shard. No writes follow.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), SplitError>> + Send + '_>>;
}

/// Creates shard sinks by file name.
pub trait ShardFactory: Send {
    type Sink: ByteSink;

    fn open<'a>(
        &'a mut self,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Sink, SplitError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem
// ─────────────────────────────────────────────────────────────────────────────

/// Creates shard files inside a target directory.
#[derive(Debug, Clone)]
pub struct FsShardFactory {
    target_dir: PathBuf,
}

impl FsShardFactory {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }
}

impl ShardFactory for FsShardFactory {
    type Sink = FileSink;

    fn open<'a>(
        &'a mut self,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FileSink, SplitError>> + Send + 'a>> {
        Box::pin(async move { FileSink::create(self.target_dir.join(file_name)).await })
    }
}

/// Buffered writer over one shard file.
pub struct FileSink {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileSink {
    /// Creates (or truncates) the shard file.
    pub async fn create(path: PathBuf) -> Result<Self, SplitError> {
        let file = File::create(&path).await.map_err(|e| {
            SplitError::SinkWriteFailure(format!(
                "Failed to create shard file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SplitError> {
        self.writer.write_all(bytes).await.map_err(|e| {
            SplitError::SinkWriteFailure(format!(
                "Failed to write to {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), SplitError> {
        self.writer.flush().await.map_err(|e| {
            SplitError::SinkWriteFailure(format!(
                "Failed to flush {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl ByteSink for FileSink {
    fn write<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), SplitError>> + Send + 'a>> {
        Box::pin(self.write_all(bytes))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), SplitError>> + Send + '_>> {
        Box::pin(async move {
            self.flush().await?;
            self.writer.shutdown().await.map_err(|e| {
                SplitError::SinkWriteFailure(format!(
                    "Failed to close {}: {}",
                    self.path.display(),
                    e
                ))
            })
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// A shard captured in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryShard {
    pub name: String,
    pub data: Vec<u8>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    shards: Vec<MemoryShard>,
    failing_opens: u32,
    fail_writes_after: Option<usize>,
    writes: usize,
}

/// Shard factory that keeps every shard in memory.
///
/// Clones share the same storage, so a test can keep one handle for
/// inspection while the pipeline owns another. Failures can be injected
/// to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryShardFactory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryShardFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(self, count: u32) -> Self {
        lock(&self.state).failing_opens = count;
        self
    }

    /// Lets the first `writes` writes succeed and fails every later one.
    pub fn fail_writes_after(self, writes: usize) -> Self {
        lock(&self.state).fail_writes_after = Some(writes);
        self
    }

    /// Snapshot of all shards in creation order.
    pub fn shards(&self) -> Vec<MemoryShard> {
        lock(&self.state).shards.clone()
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ShardFactory for MemoryShardFactory {
    type Sink = MemorySink;

    fn open<'a>(
        &'a mut self,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<MemorySink, SplitError>> + Send + 'a>> {
        let mut state = lock(&self.state);
        let result = if state.failing_opens > 0 {
            state.failing_opens -= 1;
            Err(SplitError::SinkWriteFailure(format!(
                "Injected open failure for {}",
                file_name
            )))
        } else {
            state.shards.push(MemoryShard {
                name: file_name.to_string(),
                ..MemoryShard::default()
            });
            let index = state.shards.len() - 1;
            Ok(MemorySink {
                state: Arc::clone(&self.state),
                index,
            })
        };
        drop(state);
        Box::pin(async move { result })
    }
}

/// Sink handle into a [`MemoryShardFactory`] shard.
#[derive(Debug)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    index: usize,
}

impl ByteSink for MemorySink {
    fn write<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), SplitError>> + Send + 'a>> {
        let mut state = lock(&self.state);
        let fail_after = state.fail_writes_after;
        let result = match fail_after {
            Some(limit) if state.writes >= limit => {
                let name = state.shards[self.index].name.clone();
                Err(SplitError::SinkWriteFailure(format!(
                    "Injected write failure on {}",
                    name
                )))
            }
            _ => {
                state.writes += 1;
                state.shards[self.index].data.extend_from_slice(bytes);
                Ok(())
            }
        };
        drop(state);
        Box::pin(async move {
            // Completes on a later poll, like a real write.
            tokio::task::yield_now().await;
            result
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), SplitError>> + Send + '_>> {
        lock(&self.state).shards[self.index].closed = true;
        Box::pin(async { Ok(()) })
    }
}
