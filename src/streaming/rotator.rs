//! Shard rotation.
//!
//! The rotator owns the single open shard. Blocks are appended whole; once
//! a shard holds `limit` lines it is closed and the next shard is opened
//! lazily, right before the next block is written. Splitting an exact
//! multiple of `limit` lines therefore never leaves an empty trailing shard.

use std::path::Path;
use std::time::Duration;

use crate::error::SplitError;
use crate::streaming::events::{EventEmitter, SplitEvent};
use crate::streaming::sink::{ByteSink, ShardFactory};

/// Base delay between shard open attempts; doubles per retry.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(25);

// ─────────────────────────────────────────────────────────────────────────────
// Naming
// ─────────────────────────────────────────────────────────────────────────────

/// Builds `<stem>_<index><.ext>` shard names from the source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardNamer {
    stem: String,
    extension: Option<String>,
}

impl ShardNamer {
    pub fn from_source(source: &Path) -> Self {
        Self {
            stem: source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: source
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
        }
    }

    pub fn name(&self, index: u64) -> String {
        match self.extension {
            Some(ref ext) => format!("{}_{}.{}", self.stem, index, ext),
            None => format!("{}_{}", self.stem, index),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OutputRotator
// ─────────────────────────────────────────────────────────────────────────────

/// Final accounting of the shards a rotator produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub file_names: Vec<String>,
    pub lines_per_file: Vec<u64>,
    pub total_bytes: u64,
}

/// Writes blocks into shards, opening a new shard every `limit` lines.
pub struct OutputRotator<F: ShardFactory> {
    factory: F,
    namer: ShardNamer,
    limit: u64,
    open_retries: u32,
    events: EventEmitter,
    current: Option<F::Sink>,
    lines_written: u64,
    report: RotationReport,
}

impl<F: ShardFactory> OutputRotator<F> {
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn new(factory: F, namer: ShardNamer, limit: u64, events: EventEmitter) -> Self {
        assert!(limit > 0, "limit must be greater than 0");

        Self {
            factory,
            namer,
            limit,
            open_retries: 0,
            events,
            current: None,
            lines_written: 0,
            report: RotationReport::default(),
        }
    }

    /// Sets how many times a failed shard open is retried.
    pub fn with_open_retries(mut self, retries: u32) -> Self {
        self.open_retries = retries;
        self
    }

    /// Lines in the open shard.
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Number of shards created so far.
    pub fn file_count(&self) -> u64 {
        self.report.file_names.len() as u64
    }

    /// Opens the first shard if none has been opened yet.
    pub async fn open_first(&mut self) -> Result<(), SplitError> {
        if self.current.is_none() && self.report.file_names.is_empty() {
            self.open_next().await?;
        }
        Ok(())
    }

    /// Appends one block of `lines` lines to the open shard, rotating first
    /// if the shard is already full.
    ///
    /// `lines` may be 0 for the leading bytes of a line that is not yet
    /// terminated. `bytes` may be empty when only the count changes.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::SinkWriteFailure` if the shard cannot be
    /// written, closed or replaced.
    pub async fn write_block(&mut self, bytes: &[u8], lines: u64) -> Result<(), SplitError> {
        debug_assert!(self.lines_written <= self.limit, "shard overfilled");
        debug_assert!(lines <= self.limit, "block exceeds the line limit");

        if self.current.is_none() || self.lines_written >= self.limit {
            self.rotate().await?;
        }

        let sink = self.current.as_mut().ok_or_else(|| {
            SplitError::SinkWriteFailure("No shard open for writing".to_string())
        })?;
        if !bytes.is_empty() {
            sink.write(bytes).await?;
        }

        self.lines_written += lines;
        self.report.total_bytes += bytes.len() as u64;
        if let Some(count) = self.report.lines_per_file.last_mut() {
            *count += lines;
        }
        Ok(())
    }

    /// Closes the open shard and returns the accounting.
    pub async fn finish(mut self) -> Result<RotationReport, SplitError> {
        self.close_current().await?;
        Ok(self.report)
    }

    async fn rotate(&mut self) -> Result<(), SplitError> {
        self.close_current().await?;
        self.open_next().await
    }

    async fn close_current(&mut self) -> Result<(), SplitError> {
        if let Some(mut sink) = self.current.take() {
            sink.close().await?;
            tracing::debug!(
                shard_index = self.file_count() - 1,
                lines = self.lines_written,
                "Closed shard"
            );
        }
        Ok(())
    }

    async fn open_next(&mut self) -> Result<(), SplitError> {
        let file_name = self.namer.name(self.file_count());
        let mut attempt: u32 = 0;

        let sink = loop {
            match self.factory.open(&file_name).await {
                Ok(sink) => break sink,
                Err(e) if e.is_retryable() && attempt < self.open_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        shard = %file_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Failed to open shard, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        self.current = Some(sink);
        self.lines_written = 0;
        self.report.file_names.push(file_name.clone());
        self.report.lines_per_file.push(0);

        tracing::debug!(shard = %file_name, "Created shard");
        self.events.emit(SplitEvent::FileCreated { file_name });
        Ok(())
    }
}
