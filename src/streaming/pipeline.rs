//! The split pipeline: source → coordinator → scanner → planner → rotator.
//!
//! Runs as one sequential task with two suspension points: waiting for the
//! next chunk and waiting for a block write. The coordinator decides when a
//! chunk may be admitted, so at most one buffer's blocks are in flight.
//!
//! The next chunk is pulled only after the previous buffer is fully
//! drained, so `Readable` always finds the coordinator writable here and
//! `CoordinatorState::AwaitingDrain` is never observed by this driver.
//!
//! Bytes of a line whose delimiter has not arrived yet are written straight
//! away to the shard that line belongs to. Only the last
//! `delimiter.len() - 1` bytes are held back, so a delimiter split across
//! two chunks is still found and memory stays bounded by one chunk.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::config::Delimiter;
use crate::error::SplitError;
use crate::streaming::coordinator::{Action, Signal, StreamCoordinator};
use crate::streaming::events::{EventEmitter, SplitEvent};
use crate::streaming::planner::{self, PlanState};
use crate::streaming::rotator::{OutputRotator, ShardNamer};
use crate::streaming::scanner;
use crate::streaming::sink::ShardFactory;
use crate::streaming::source::ByteSource;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub limit: u64,
    pub delimiter: Delimiter,
    pub sink_retries: u32,
}

/// Outcome of a completed split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    /// Shard names in creation order.
    pub file_names: Vec<String>,
    /// Total lines written across all shards.
    pub total_lines: u64,
    /// Lines in each shard (parallel to `file_names`).
    pub lines_per_file: Vec<u64>,
    /// Total bytes written across all shards.
    pub total_bytes: u64,
}

impl SplitSummary {
    pub fn file_count(&self) -> u64 {
        self.file_names.len() as u64
    }
}

enum Flow {
    Continue,
    Completed(SplitSummary),
}

// ─────────────────────────────────────────────────────────────────────────────
// SplitPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one source into a family of shards.
pub struct SplitPipeline<S: ByteSource, F: ShardFactory> {
    source: S,
    rotator: Option<OutputRotator<F>>,
    coordinator: StreamCoordinator,
    events: EventEmitter,
    delimiter: Delimiter,
    limit: u64,
    plan_state: PlanState,
    /// Chunks admitted but not yet scanned.
    pending: Vec<Bytes>,
    /// Trailing bytes that may be the start of a delimiter.
    tail: Bytes,
    /// The current line already has bytes in the open shard.
    partial_line: bool,
    input_ended: bool,
    total_lines: u64,
    buffers: u64,
}

impl<S: ByteSource, F: ShardFactory> SplitPipeline<S, F> {
    /// # Panics
    ///
    /// Panics if `options.limit` is 0.
    pub fn new(
        source: S,
        factory: F,
        namer: ShardNamer,
        options: PipelineOptions,
        events: EventEmitter,
    ) -> Self {
        let rotator = OutputRotator::new(factory, namer, options.limit, events.clone())
            .with_open_retries(options.sink_retries);

        Self {
            source,
            rotator: Some(rotator),
            coordinator: StreamCoordinator::new(),
            events,
            delimiter: options.delimiter,
            limit: options.limit,
            plan_state: PlanState::default(),
            pending: Vec::new(),
            tail: Bytes::new(),
            partial_line: false,
            input_ended: false,
            total_lines: 0,
            buffers: 0,
        }
    }

    /// Runs the split to completion.
    ///
    /// The first shard is created before the source is read, so an empty
    /// source still produces one (empty) shard.
    ///
    /// # Errors
    ///
    /// Stops at the first source or sink failure. No completion event is
    /// emitted in that case and shards written so far are left in place.
    pub async fn run(mut self) -> Result<SplitSummary, SplitError> {
        self.rotator_mut()?.open_first().await?;
        self.coordinator.start();
        tracing::debug!(limit = self.limit, "Split pipeline started");

        loop {
            let flow = match self.source.next_chunk().await? {
                Some(chunk) => {
                    self.pending.push(chunk);
                    self.dispatch(Signal::Readable).await?
                }
                None => {
                    self.input_ended = true;
                    if self.partial_line || !self.tail.is_empty() {
                        // The unterminated last line is the last readable data.
                        if let Flow::Completed(summary) = self.dispatch(Signal::Readable).await? {
                            return Ok(summary);
                        }
                    }
                    self.dispatch(Signal::SourceEnded).await?
                }
            };

            if let Flow::Completed(summary) = flow {
                return Ok(summary);
            }
        }
    }

    async fn dispatch(&mut self, signal: Signal) -> Result<Flow, SplitError> {
        let mut action = self.coordinator.on(signal);
        loop {
            match action {
                Action::Wait => return Ok(Flow::Continue),
                Action::BeginDrain => {
                    self.drain().await?;
                    action = self.coordinator.on(Signal::Drained);
                }
                Action::Complete => return self.complete().await.map(Flow::Completed),
            }
        }
    }

    /// Scans, plans and writes everything admitted so far.
    async fn drain(&mut self) -> Result<(), SplitError> {
        let buffer = self.take_buffer();
        let index = scanner::scan(&buffer, &self.delimiter);
        let mut plan = planner::plan(&index, self.plan_state.carry_lines, self.limit);
        let block_count = plan.blocks().len();

        let rotator = self
            .rotator
            .as_mut()
            .ok_or_else(|| SplitError::SinkWriteFailure("output already finished".to_string()))?;
        while let Some(block) = plan.next_block() {
            rotator
                .write_block(&buffer[block.byte_start..block.byte_end], block.lines)
                .await?;
        }
        self.plan_state = plan.state();
        self.total_lines += index.count as u64;
        if index.count > 0 {
            self.partial_line = false;
        }

        let rest = buffer.slice(index.terminated_len()..);
        if self.input_ended {
            if self.partial_line || !rest.is_empty() {
                rotator.write_block(&rest, 1).await?;
                self.plan_state.carry_lines = (self.plan_state.carry_lines + 1) % self.limit;
                self.total_lines += 1;
                self.partial_line = false;
            }
        } else {
            let held = rest.len().min(self.delimiter.len().saturating_sub(1));
            let ready = rest.slice(..rest.len() - held);
            if !ready.is_empty() {
                // Counted once its delimiter arrives; rotates first if the shard is full.
                rotator.write_block(&ready, 0).await?;
                self.partial_line = true;
            }
            self.tail = rest.slice(rest.len() - held..);
        }

        self.buffers += 1;
        tracing::debug!(
            buffer = self.buffers,
            bytes = buffer.len(),
            lines = index.count,
            blocks = block_count,
            carry = self.plan_state.carry_lines,
            held = self.tail.len(),
            partial_line = self.partial_line,
            "Drained buffer"
        );
        Ok(())
    }

    /// Joins the held bytes and the admitted chunks into one buffer.
    fn take_buffer(&mut self) -> Bytes {
        if self.tail.is_empty() && self.pending.len() == 1 {
            if let Some(chunk) = self.pending.pop() {
                return chunk;
            }
        }

        let size = self.tail.len() + self.pending.iter().map(Bytes::len).sum::<usize>();
        let mut joined = BytesMut::with_capacity(size);
        joined.extend_from_slice(&self.tail);
        for chunk in self.pending.drain(..) {
            joined.extend_from_slice(&chunk);
        }
        self.tail = Bytes::new();
        joined.freeze()
    }

    async fn complete(&mut self) -> Result<SplitSummary, SplitError> {
        let rotator = self
            .rotator
            .take()
            .ok_or_else(|| SplitError::SinkWriteFailure("output already finished".to_string()))?;
        let report = rotator.finish().await?;

        let summary = SplitSummary {
            total_lines: self.total_lines,
            total_bytes: report.total_bytes,
            lines_per_file: report.lines_per_file,
            file_names: report.file_names,
        };

        tracing::info!(
            files = summary.file_count(),
            lines = summary.total_lines,
            bytes = summary.total_bytes,
            "Split complete"
        );
        self.events.emit(SplitEvent::Complete {
            file_count: summary.file_count(),
        });
        Ok(summary)
    }

    fn rotator_mut(&mut self) -> Result<&mut OutputRotator<F>, SplitError> {
        self.rotator
            .as_mut()
            .ok_or_else(|| SplitError::SinkWriteFailure("output already finished".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::sink::MemoryShardFactory;
    use crate::streaming::source::ChunkedSource;
    use std::future::Future;
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Replays chunks, then fails instead of reporting the end of input.
    struct FailingSource {
        chunks: ChunkedSource,
    }

    impl ByteSource for FailingSource {
        fn next_chunk(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, SplitError>> + Send + '_>> {
            Box::pin(async move {
                match self.chunks.next_chunk().await? {
                    Some(chunk) => Ok(Some(chunk)),
                    None => Err(SplitError::SourceUnavailable(
                        "Failed to read source: device removed".to_string(),
                    )),
                }
            })
        }
    }

    /// Records how many bytes the shards hold each time a chunk is requested.
    struct ObservedSource {
        chunks: ChunkedSource,
        shards: MemoryShardFactory,
        written_before_read: Arc<Mutex<Vec<usize>>>,
    }

    impl ByteSource for ObservedSource {
        fn next_chunk(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, SplitError>> + Send + '_>> {
            let written: usize = self.shards.shards().iter().map(|s| s.data.len()).sum();
            self.written_before_read.lock().unwrap().push(written);
            self.chunks.next_chunk()
        }
    }

    fn lines(count: usize) -> Vec<u8> {
        (0..count).flat_map(|i| format!("line {}\n", i).into_bytes()).collect()
    }

    fn options(limit: u64) -> PipelineOptions {
        PipelineOptions {
            limit,
            delimiter: Delimiter::newline(),
            sink_retries: 0,
        }
    }

    async fn run_split(
        source: ChunkedSource,
        limit: u64,
    ) -> (Result<SplitSummary, SplitError>, MemoryShardFactory, Vec<SplitEvent>) {
        let factory = MemoryShardFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = SplitPipeline::new(
            source,
            factory.clone(),
            ShardNamer::from_source(Path::new("source.txt")),
            options(limit),
            EventEmitter::new(tx),
        )
        .run()
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, factory, events)
    }

    fn count_lines(data: &[u8]) -> usize {
        data.iter().filter(|b| **b == b'\n').count()
    }

    #[tokio::test]
    async fn test_250_lines_limit_100() {
        let data = lines(250);
        let (result, factory, events) =
            run_split(ChunkedSource::with_chunk_size(data.clone(), 4096), 100).await;
        let summary = result.expect("split succeeds");

        assert_eq!(summary.file_names, vec!["source_0.txt", "source_1.txt", "source_2.txt"]);
        assert_eq!(summary.lines_per_file, vec![100, 100, 50]);
        assert_eq!(summary.total_lines, 250);
        assert_eq!(summary.total_bytes, data.len() as u64);

        let shards = factory.shards();
        let line_counts: Vec<usize> = shards.iter().map(|s| count_lines(&s.data)).collect();
        assert_eq!(line_counts, vec![100, 100, 50]);

        assert_eq!(events.last(), Some(&SplitEvent::Complete { file_count: 3 }));
        let created = events
            .iter()
            .filter(|e| matches!(e, SplitEvent::FileCreated { .. }))
            .count();
        assert_eq!(created, 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_trailing_shard() {
        let (result, factory, events) =
            run_split(ChunkedSource::with_chunk_size(lines(200), 777), 100).await;
        let summary = result.expect("split succeeds");

        assert_eq!(summary.lines_per_file, vec![100, 100]);
        assert_eq!(factory.shards().len(), 2);
        assert_eq!(events.last(), Some(&SplitEvent::Complete { file_count: 2 }));
    }

    #[tokio::test]
    async fn test_empty_source_creates_one_shard() {
        let (result, factory, events) = run_split(ChunkedSource::default(), 100).await;
        let summary = result.expect("split succeeds");

        assert_eq!(summary.file_names, vec!["source_0.txt"]);
        assert_eq!(summary.lines_per_file, vec![0]);
        assert_eq!(summary.total_lines, 0);
        assert!(factory.shards()[0].data.is_empty());
        assert_eq!(
            events,
            vec![
                SplitEvent::FileCreated {
                    file_name: "source_0.txt".into()
                },
                SplitEvent::Complete { file_count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_chunks_split_mid_line() {
        let source = ChunkedSource::new(vec![&b"aa\nb"[..], &b"b\ncc"[..], &b"\ndd\n"[..]]);
        let (result, factory, _) = run_split(source, 2).await;
        let summary = result.expect("split succeeds");

        assert_eq!(summary.lines_per_file, vec![2, 2]);
        let shards = factory.shards();
        assert_eq!(shards[0].data, b"aa\nbb\n");
        assert_eq!(shards[1].data, b"cc\ndd\n");
    }

    #[tokio::test]
    async fn test_unterminated_final_line_counts() {
        let source = ChunkedSource::new(vec![&b"a\nb\nc"[..]]);
        let (result, factory, _) = run_split(source, 2).await;
        let summary = result.expect("split succeeds");

        assert_eq!(summary.total_lines, 3);
        assert_eq!(summary.lines_per_file, vec![2, 1]);
        assert_eq!(factory.shards()[1].data, b"c");
    }

    #[tokio::test]
    async fn test_single_unterminated_line() {
        let (result, factory, _) = run_split(ChunkedSource::new(vec![&b"xyz"[..]]), 5).await;
        let summary = result.expect("split succeeds");

        assert_eq!(summary.total_lines, 1);
        assert_eq!(summary.lines_per_file, vec![1]);
        assert_eq!(factory.shards()[0].data, b"xyz");
    }

    #[tokio::test]
    async fn test_multi_byte_delimiter_across_chunks() {
        let factory = MemoryShardFactory::new();
        let source = ChunkedSource::new(vec![&b"a\r"[..], &b"\nb\r\nc\r"[..], &b"\n"[..]]);
        let summary = SplitPipeline::new(
            source,
            factory.clone(),
            ShardNamer::from_source(Path::new("win.txt")),
            PipelineOptions {
                limit: 2,
                delimiter: Delimiter::bytes("\r\n"),
                sink_retries: 0,
            },
            EventEmitter::disabled(),
        )
        .run()
        .await
        .expect("split succeeds");

        assert_eq!(summary.lines_per_file, vec![2, 1]);
        let shards = factory.shards();
        assert_eq!(shards[0].data, b"a\r\nb\r\n");
        assert_eq!(shards[1].data, b"c\r\n");
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_without_complete() {
        let factory = MemoryShardFactory::new().fail_writes_after(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = SplitPipeline::new(
            ChunkedSource::new(vec![&b"a\nb\n"[..], &b"c\n"[..]]),
            factory.clone(),
            ShardNamer::from_source(Path::new("f.txt")),
            options(1),
            EventEmitter::new(tx),
        )
        .run()
        .await;

        assert!(matches!(result, Err(SplitError::SinkWriteFailure(_))));
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events
            .iter()
            .all(|e| !matches!(e, SplitEvent::Complete { .. })));
        // The shard written before the fault is left in place.
        assert_eq!(factory.shards()[0].data, b"a\n");
    }

    #[tokio::test]
    async fn test_source_failure_mid_run_keeps_written_shards() {
        let factory = MemoryShardFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = FailingSource {
            chunks: ChunkedSource::new(vec![&b"a\nb\n"[..], &b"c\n"[..]]),
        };
        let result = SplitPipeline::new(
            source,
            factory.clone(),
            ShardNamer::from_source(Path::new("feed.txt")),
            options(1),
            EventEmitter::new(tx),
        )
        .run()
        .await;

        assert!(matches!(result, Err(SplitError::SourceUnavailable(_))));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| matches!(e, SplitEvent::FileCreated { .. })));

        let data: Vec<Vec<u8>> = factory.shards().into_iter().map(|s| s.data).collect();
        assert_eq!(data, vec![b"a\n".to_vec(), b"b\n".to_vec(), b"c\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_unterminated_line_streams_before_end_of_input() {
        let factory = MemoryShardFactory::new();
        let written_before_read = Arc::new(Mutex::new(Vec::new()));
        let source = ObservedSource {
            chunks: ChunkedSource::with_chunk_size(vec![b'x'; 4096], 1024),
            shards: factory.clone(),
            written_before_read: written_before_read.clone(),
        };

        let summary = SplitPipeline::new(
            source,
            factory.clone(),
            ShardNamer::from_source(Path::new("blob.bin")),
            options(100),
            EventEmitter::disabled(),
        )
        .run()
        .await
        .expect("split succeeds");

        assert_eq!(
            *written_before_read.lock().unwrap(),
            vec![0, 1024, 2048, 3072, 4096]
        );
        assert_eq!(summary.total_lines, 1);
        assert_eq!(summary.lines_per_file, vec![1]);
        assert_eq!(factory.shards()[0].data.len(), 4096);
    }

    #[tokio::test]
    async fn test_split_delimiter_bytes_are_held_back() {
        let factory = MemoryShardFactory::new();
        let written_before_read = Arc::new(Mutex::new(Vec::new()));
        let source = ObservedSource {
            chunks: ChunkedSource::new(vec![&b"abc\r"[..], &b"\ndef"[..]]),
            shards: factory.clone(),
            written_before_read: written_before_read.clone(),
        };

        let summary = SplitPipeline::new(
            source,
            factory.clone(),
            ShardNamer::from_source(Path::new("dos.txt")),
            PipelineOptions {
                limit: 1,
                delimiter: Delimiter::bytes("\r\n"),
                sink_retries: 0,
            },
            EventEmitter::disabled(),
        )
        .run()
        .await
        .expect("split succeeds");

        // "abc" is written at once while the lone "\r" waits for the next
        // chunk. Likewise the trailing "f" waits for end of input.
        assert_eq!(*written_before_read.lock().unwrap(), vec![0, 3, 7]);
        assert_eq!(summary.lines_per_file, vec![1, 1]);
        let shards = factory.shards();
        assert_eq!(shards[0].data, b"abc\r\n");
        assert_eq!(shards[1].data, b"def");
    }

    #[tokio::test]
    async fn test_every_shard_closed_before_complete() {
        let (result, factory, _) =
            run_split(ChunkedSource::with_chunk_size(lines(10), 7), 3).await;
        result.expect("split succeeds");
        assert!(factory.shards().iter().all(|s| s.closed));
    }
}
