//! Line-bounded splitting of large text files.
//!
//! Streams the source in chunks and never holds more than one chunk's
//! worth of unwritten data. Each shard holds at most `limit` lines and the
//! shards, concatenated in index order, reproduce the source byte for byte.

use tokio::sync::mpsc::UnboundedSender;

use crate::config::SplitConfig;
use crate::error::SplitError;
use crate::streaming::{
    EventEmitter, FileSource, FsShardFactory, PipelineOptions, ShardNamer, SplitEvent,
    SplitPipeline, SplitSummary,
};

/// Splits one source file into shards named `<stem>_<index><.ext>`.
///
/// # Usage
///
/// ```ignore
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let mut splitter = TextFileSplitter::new(SplitConfig::new("big.log", "out").limit(1000))
///     .with_events(tx);
/// let summary = splitter.start().await?;
/// ```
pub struct TextFileSplitter {
    config: SplitConfig,
    events: EventEmitter,
    started: bool,
}

impl TextFileSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self {
            config,
            events: EventEmitter::disabled(),
            started: false,
        }
    }

    /// Sends `FileCreated` and `Complete` notifications to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<SplitEvent>) -> Self {
        self.events = EventEmitter::new(tx);
        self
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Runs the split.
    ///
    /// Returns `Ok(None)` without doing anything if this splitter was
    /// already started, whatever the outcome of that first run.
    ///
    /// # Errors
    ///
    /// - `SplitError::InvalidConfiguration` before any shard is created if
    ///   the configuration is rejected.
    /// - `SplitError::SourceUnavailable` if the source cannot be opened or read.
    /// - `SplitError::SinkWriteFailure` if a shard cannot be created or written.
    pub async fn start(&mut self) -> Result<Option<SplitSummary>, SplitError> {
        if self.started {
            tracing::debug!(source = %self.config.source_file.display(), "Split already started");
            return Ok(None);
        }
        self.started = true;

        self.config.validate().await?;

        tracing::info!(
            source = %self.config.source_file.display(),
            target = %self.config.target_path.display(),
            limit = self.config.limit,
            max_store = self.config.max_store,
            "Starting split"
        );

        let source = FileSource::open(&self.config.source_file, self.config.max_store).await?;
        let factory = FsShardFactory::new(&self.config.target_path);
        let pipeline = SplitPipeline::new(
            source,
            factory,
            ShardNamer::from_source(&self.config.source_file),
            PipelineOptions {
                limit: self.config.limit,
                delimiter: self.config.delimiter.clone(),
                sink_retries: self.config.sink_retries,
            },
            self.events.clone(),
        );

        pipeline.run().await.map(Some)
    }
}

/// Splits `config.source_file` into shards under `config.target_path`.
///
/// # Errors
///
/// See [`TextFileSplitter::start`].
pub async fn split_file(config: SplitConfig) -> Result<SplitSummary, SplitError> {
    let mut splitter = TextFileSplitter::new(config);
    splitter.start().await?.ok_or_else(|| {
        SplitError::InvalidConfiguration("splitter was already started".to_string())
    })
}
