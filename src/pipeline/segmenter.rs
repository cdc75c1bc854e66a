//! Wake-word segmentation state machine.
//!
//! Consumes chunks in arrival order and decides when to scan for the wake
//! phrase, when a command starts and when it ends. All timing is counted in
//! samples, so a chunk's position in the stream is its clock.
//!
//! The segmenter never calls recognition itself: it returns a
//! [`SegmenterAction`] and the worker carries it out.

use crate::audio::rolling::RollingContext;
use crate::audio::vad::SpeechDetector;
use crate::defaults::{self, ms_to_samples};
use crate::pipeline::types::{
    AudioChunk, CapturedCommand, FinalizeReason, ListenerState, ScanOutcome, ScanRequest,
};

/// Segmentation timing, in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    pub context_samples: usize,
    pub scan_interval_samples: usize,
    pub min_scan_samples: usize,
    pub onset_samples: usize,
    pub grace_samples: usize,
    pub pause_samples: usize,
    pub min_command_samples: usize,
    pub max_command_samples: usize,
    pub vad_threshold: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        let rate = defaults::SAMPLE_RATE;
        Self {
            sample_rate: rate,
            context_samples: ms_to_samples(defaults::CONTEXT_MS, rate),
            scan_interval_samples: ms_to_samples(defaults::SCAN_INTERVAL_MS, rate),
            min_scan_samples: ms_to_samples(defaults::MIN_SCAN_MS, rate),
            onset_samples: ms_to_samples(defaults::ONSET_MS, rate),
            grace_samples: ms_to_samples(defaults::GRACE_MS, rate),
            pause_samples: ms_to_samples(defaults::PAUSE_MS, rate),
            min_command_samples: ms_to_samples(defaults::MIN_COMMAND_MS, rate),
            max_command_samples: ms_to_samples(defaults::MAX_COMMAND_MS, rate),
            vad_threshold: defaults::VAD_THRESHOLD,
        }
    }
}

/// Work the segmenter asks the worker to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterAction {
    /// Run a wake-word scan over the snapshot.
    Scan(ScanRequest),
    /// Wake phrase confirmed: play the acknowledgment.
    Acknowledge,
    /// Command captured: recognize, resolve and dispatch it, then call
    /// [`Segmenter::complete_finalization`].
    Finalize(CapturedCommand),
}

/// Audio of the command being captured.
#[derive(Debug)]
pub struct CommandBuffer {
    samples: Vec<f32>,
    ceiling: usize,
    warned: bool,
}

impl CommandBuffer {
    pub fn new(ceiling: usize) -> Self {
        Self {
            samples: Vec::new(),
            ceiling,
            warned: false,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
        if !self.warned && self.samples.len() >= self.ceiling {
            self.warned = true;
            tracing::warn!(
                samples = self.samples.len(),
                "command reached the length ceiling; forcing finalization"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn at_ceiling(&self) -> bool {
        self.samples.len() >= self.ceiling
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Move the samples out and reset the ceiling warning.
    pub fn take(&mut self) -> Vec<f32> {
        self.warned = false;
        std::mem::take(&mut self.samples)
    }

    pub fn clear(&mut self) {
        self.warned = false;
        self.samples.clear();
    }
}

/// Scan that has been dispatched and not yet answered.
#[derive(Debug)]
struct PendingScan {
    id: u64,
    end_position: u64,
    onset: Vec<f32>,
}

pub struct Segmenter {
    config: SegmenterConfig,
    detector: SpeechDetector,
    rolling: RollingContext,
    command: CommandBuffer,
    state: ListenerState,
    samples_since_scan: usize,
    next_scan_id: u64,
    pending_scan: Option<PendingScan>,
    grace_elapsed: usize,
    silence_run: usize,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            detector: SpeechDetector::new(config.vad_threshold),
            rolling: RollingContext::new(config.context_samples),
            command: CommandBuffer::new(config.max_command_samples),
            state: ListenerState::Idle,
            samples_since_scan: 0,
            next_scan_id: 0,
            pending_scan: None,
            grace_elapsed: 0,
            silence_run: 0,
            config,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Shared handle to the rolling window.
    pub fn rolling(&self) -> &RollingContext {
        &self.rolling
    }

    pub fn command(&self) -> &CommandBuffer {
        &self.command
    }

    /// Feed one chunk.
    pub fn on_chunk(&mut self, chunk: &AudioChunk) -> Option<SegmenterAction> {
        let samples = chunk.samples.as_slice();
        match self.state {
            ListenerState::Idle => {
                self.rolling.append(samples);
                self.samples_since_scan += samples.len();
                self.maybe_scan()
            }
            ListenerState::ScanPending => {
                self.rolling.append(samples);
                self.samples_since_scan += samples.len();
                None
            }
            ListenerState::ConfirmDelay => {
                if self.grace_elapsed >= self.config.grace_samples {
                    tracing::debug!("grace period over; evaluating silence");
                    self.state = ListenerState::Recording;
                    return self.record(samples);
                }
                self.command.push(samples);
                self.grace_elapsed += samples.len();
                if self.command.at_ceiling() {
                    return Some(self.finalize(FinalizeReason::Ceiling));
                }
                None
            }
            ListenerState::Recording => self.record(samples),
            ListenerState::Finalizing => {
                // Keep context warm; no scans until the command is handled.
                self.rolling.append(samples);
                None
            }
        }
    }

    /// Apply a scan result. Results for stale or unknown scans are ignored.
    pub fn on_scan_outcome(&mut self, outcome: &ScanOutcome) -> Option<SegmenterAction> {
        let is_current = self.state == ListenerState::ScanPending
            && self
                .pending_scan
                .as_ref()
                .is_some_and(|pending| pending.id == outcome.id);
        if !is_current {
            tracing::debug!(id = outcome.id, state = %self.state, "ignoring stale scan result");
            return None;
        }
        let pending = self.pending_scan.take()?;

        if !outcome.detected {
            self.state = ListenerState::Idle;
            return None;
        }

        let interim = self.rolling.tail_since(pending.end_position);
        self.command.clear();
        self.command.push(&pending.onset);
        self.command.push(&interim);
        self.rolling.clear();
        self.samples_since_scan = 0;
        self.grace_elapsed = 0;
        self.silence_run = 0;
        self.state = ListenerState::ConfirmDelay;
        tracing::debug!(
            seeded = self.command.len(),
            interim = interim.len(),
            "wake phrase confirmed"
        );
        Some(SegmenterAction::Acknowledge)
    }

    /// Return to `Idle` after a finalized command was handled.
    pub fn complete_finalization(&mut self) {
        self.command.clear();
        self.rolling.clear();
        self.samples_since_scan = 0;
        self.silence_run = 0;
        self.grace_elapsed = 0;
        self.state = ListenerState::Idle;
    }

    /// Input ended: close a command in progress if it is long enough.
    pub fn flush(&mut self) -> Option<CapturedCommand> {
        match self.state {
            ListenerState::ConfirmDelay | ListenerState::Recording
                if self.command.len() >= self.config.min_command_samples =>
            {
                match self.finalize(FinalizeReason::EndOfStream) {
                    SegmenterAction::Finalize(command) => Some(command),
                    _ => None,
                }
            }
            _ => {
                self.reset();
                None
            }
        }
    }

    /// Drop all in-progress work and return to `Idle`.
    pub fn reset(&mut self) {
        self.pending_scan = None;
        self.complete_finalization();
    }

    fn maybe_scan(&mut self) -> Option<SegmenterAction> {
        if self.samples_since_scan < self.config.scan_interval_samples
            || self.rolling.len() < self.config.min_scan_samples
        {
            return None;
        }
        self.samples_since_scan = 0;
        let snapshot = self.rolling.snapshot();
        let id = self.next_scan_id;
        self.next_scan_id += 1;
        self.pending_scan = Some(PendingScan {
            id,
            end_position: snapshot.end_position,
            onset: snapshot.tail(self.config.onset_samples).to_vec(),
        });
        self.state = ListenerState::ScanPending;
        Some(SegmenterAction::Scan(ScanRequest { id, snapshot }))
    }

    fn record(&mut self, samples: &[f32]) -> Option<SegmenterAction> {
        self.command.push(samples);
        let speech = self.detector.is_speech(samples);
        if speech {
            self.silence_run = 0;
        } else {
            self.silence_run += samples.len();
        }

        if self.command.at_ceiling() {
            return Some(self.finalize(FinalizeReason::Ceiling));
        }
        if !speech
            && self.silence_run >= self.config.pause_samples
            && self.command.len() >= self.config.min_command_samples
        {
            return Some(self.finalize(FinalizeReason::Pause));
        }
        None
    }

    fn finalize(&mut self, reason: FinalizeReason) -> SegmenterAction {
        self.state = ListenerState::Finalizing;
        SegmenterAction::Finalize(CapturedCommand {
            samples: self.command.take(),
            reason,
        })
    }
}
