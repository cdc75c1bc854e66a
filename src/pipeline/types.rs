//! Data types passed between listener stages.

use crate::audio::rolling::Snapshot;
use crate::commands::dispatcher::DispatchOutcome;
use std::fmt;
use std::time::Duration;

/// A fixed-size block of normalized mono samples from the capture source.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Arrival order, starting at zero.
    pub sequence: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sequence: u64) -> Self {
        Self { samples, sequence }
    }

    /// Stream time at which this chunk starts, assuming fixed-size chunks.
    pub fn timestamp(&self, chunk_samples: usize, sample_rate: u32) -> Duration {
        let offset = self.sequence * chunk_samples as u64;
        Duration::from_micros(offset * 1_000_000 / u64::from(sample_rate))
    }

    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        crate::defaults::samples_to_ms(self.samples.len(), sample_rate)
    }
}

/// Items carried by the chunk queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Chunk(AudioChunk),
    /// A finite source ran out. Pending work is flushed before the worker exits.
    EndOfStream,
    /// Shutdown requested. In-flight work is abandoned.
    Stop,
}

/// Listener state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    /// Filling the rolling buffer, waiting for the next scan.
    Idle,
    /// A wake-word scan is running on a snapshot.
    ScanPending,
    /// Wake word confirmed; capturing without evaluating silence.
    ConfirmDelay,
    /// Capturing a command until a pause or the ceiling.
    Recording,
    /// Command captured; recognition and dispatch in progress.
    Finalizing,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Idle => "idle",
            ListenerState::ScanPending => "scan-pending",
            ListenerState::ConfirmDelay => "confirm-delay",
            ListenerState::Recording => "recording",
            ListenerState::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Snapshot handed to the wake-word scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub id: u64,
    pub snapshot: Snapshot,
}

/// Result of a wake-word scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub id: u64,
    /// Transcript of the scanned window, `None` if recognition failed.
    pub transcript: Option<String>,
    pub detected: bool,
}

/// Why a command was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    /// A long enough silence followed enough speech.
    Pause,
    /// The command hit the hard length ceiling.
    Ceiling,
    /// The input ended while recording.
    EndOfStream,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizeReason::Pause => "pause",
            FinalizeReason::Ceiling => "ceiling",
            FinalizeReason::EndOfStream => "end of input",
        };
        f.write_str(name)
    }
}

/// Audio of one captured command.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedCommand {
    pub samples: Vec<f32>,
    pub reason: FinalizeReason,
}

/// Observable listener activity, rendered by the CLI and collected in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Listening,
    WakeDetected { transcript: String },
    CommandCaptured { duration_ms: u64, reason: FinalizeReason },
    /// Recognition returned nothing usable for the command audio.
    NoSpeech,
    Transcribed { text: String },
    Resolved { command: String, score: u8 },
    Dispatched(DispatchOutcome),
    ChunksDropped { total: u64 },
    Stopped,
}
