//! Streaming line partitioning.
//!
//! The pipeline scans raw chunks for delimiters, plans line-aligned blocks
//! that may straddle chunk boundaries, and writes them into rotating shards
//! while a small state machine keeps reads and writes from overlapping.

mod coordinator;
mod events;
mod pipeline;
mod planner;
mod rotator;
mod scanner;
mod sink;
mod source;

pub use coordinator::{Action, CoordinatorState, Signal, StreamCoordinator};
pub use events::{EventEmitter, SplitEvent};
pub use pipeline::{PipelineOptions, SplitPipeline, SplitSummary};
pub use planner::{plan, Block, BufferPlan, PlanState};
pub use rotator::{OutputRotator, RotationReport, ShardNamer};
pub use scanner::{scan, LineIndex};
pub use sink::{ByteSink, FileSink, FsShardFactory, MemoryShard, MemoryShardFactory, MemorySink, ShardFactory};
pub use source::{ByteSource, ChunkedSource, FileSource};
