//! Listening pipeline.
//!
//! The capture callback feeds a bounded chunk queue; a single worker thread
//! consumes it in order and drives the segmentation state machine, while a
//! scanner thread runs wake-word recognition on snapshot windows.

pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod scanner;
pub mod segmenter;
pub mod sink;
pub mod stats;
pub mod types;
pub mod worker;

pub use error::{ErrorReporter, LogReporter, StageError};
pub use orchestrator::{Listener, ListenerConfig, ListenerHandle};
pub use queue::{ChunkConsumer, ChunkProducer, OverflowPolicy, QueueControl, chunk_queue};
pub use scanner::{WakeMatcher, WakeScanner};
pub use segmenter::{CommandBuffer, Segmenter, SegmenterAction, SegmenterConfig};
pub use sink::{ChannelSink, CollectorSink, ConsoleSink, EventSink, FanOutSink};
pub use stats::{ListenerStats, StatsSnapshot};
pub use types::{
    AudioChunk, CapturedCommand, FinalizeReason, ListenerEvent, ListenerState, QueueItem,
    ScanOutcome, ScanRequest,
};
