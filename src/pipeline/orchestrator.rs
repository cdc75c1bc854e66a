//! Listener wiring: sample source → chunk queue → worker, with the wake
//! scanner beside the worker.

use crate::audio::beep::{Acknowledger, SilentAcknowledger};
use crate::audio::source::SampleSource;
use crate::commands::{ActionDispatcher, CommandResolver};
use crate::defaults;
use crate::error::Result;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::queue::{OverflowPolicy, QueueControl, chunk_queue};
use crate::pipeline::scanner::{WakeMatcher, WakeScanner};
use crate::pipeline::segmenter::{Segmenter, SegmenterConfig};
use crate::pipeline::sink::EventSink;
use crate::pipeline::stats::{ListenerStats, StatsSnapshot};
use crate::pipeline::worker::Worker;
use crate::stt::{RecognitionAdapter, Recognizer};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Configuration for the listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub segmenter: SegmenterConfig,
    /// Samples per queued chunk.
    pub chunk_samples: usize,
    /// Chunks the queue holds before the overflow policy applies.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub wake_phrase: String,
    /// Stop reading chunks while a wake scan is pending. Set for sources
    /// that are not real-time, where reading ahead would push audio that
    /// follows the wake phrase out of the rolling window.
    pub wait_for_scans: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            chunk_samples: defaults::ms_to_samples(defaults::CHUNK_MS, defaults::SAMPLE_RATE),
            queue_capacity: defaults::QUEUE_CAPACITY,
            overflow: OverflowPolicy::DropOldest,
            wake_phrase: defaults::WAKE_PHRASE.to_string(),
            wait_for_scans: false,
        }
    }
}

/// Handle to a running listener.
pub struct ListenerHandle {
    source: Box<dyn SampleSource>,
    control: QueueControl,
    worker: Option<JoinHandle<()>>,
    stats: Arc<ListenerStats>,
    reporter: Arc<dyn ErrorReporter>,
}

impl ListenerHandle {
    /// Stop capture, queue the stop sentinel and join the worker.
    ///
    /// Chunks already queued ahead of the sentinel are still processed; a
    /// command being captured is abandoned.
    pub fn stop(mut self) -> StatsSnapshot {
        if let Err(e) = self.source.stop() {
            self.reporter.report(
                "source",
                &StageError::Recoverable(format!("failed to stop {}: {}", self.source.name(), e)),
            );
        }
        self.control.stop();
        self.join_worker();
        self.stats.snapshot()
    }

    /// Block until a finite source has been fully processed.
    ///
    /// For a live source this only returns once the worker exits for
    /// another reason; use [`ListenerHandle::stop`] instead.
    pub fn wait(mut self) -> StatsSnapshot {
        self.join_worker();
        if let Err(e) = self.source.stop() {
            self.reporter.report(
                "source",
                &StageError::Recoverable(format!("failed to stop {}: {}", self.source.name(), e)),
            );
        }
        self.stats.snapshot()
    }

    /// True once the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }

    pub fn is_finite(&self) -> bool {
        self.source.is_finite()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take()
            && let Err(panic_info) = handle.join()
        {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            self.reporter.report(
                "worker",
                &StageError::Fatal(format!("listener worker panicked: {msg}")),
            );
        }
    }
}

/// Always-listening wake-word front end.
pub struct Listener {
    config: ListenerConfig,
    error_reporter: Arc<dyn ErrorReporter>,
    acknowledger: Arc<dyn Acknowledger>,
}

impl Listener {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
            acknowledger: Arc::new(SilentAcknowledger),
        }
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Sets what happens when the wake phrase is confirmed.
    pub fn with_acknowledger(mut self, acknowledger: Arc<dyn Acknowledger>) -> Self {
        self.acknowledger = acknowledger;
        self
    }

    /// Start the worker and scanner, then the source.
    ///
    /// If the source fails to start, the worker is stopped before the error
    /// is returned.
    pub fn start(
        self,
        mut source: Box<dyn SampleSource>,
        recognizer: Arc<dyn Recognizer>,
        resolver: CommandResolver,
        dispatcher: ActionDispatcher,
        sink: Box<dyn EventSink>,
    ) -> Result<ListenerHandle> {
        let (producer, consumer) = chunk_queue(
            self.config.queue_capacity,
            self.config.chunk_samples,
            self.config.overflow,
        );
        let control = producer.control();

        let adapter = RecognitionAdapter::new(recognizer);
        let scanner = WakeScanner::spawn(
            adapter.clone(),
            WakeMatcher::new(&self.config.wake_phrase),
        )?;
        let stats = Arc::new(ListenerStats::new());

        let worker = Worker::new(
            Segmenter::new(self.config.segmenter),
            scanner,
            adapter,
            resolver,
            dispatcher,
            self.acknowledger.clone(),
            sink,
            self.error_reporter.clone(),
            stats.clone(),
        )
        .with_wait_for_scans(self.config.wait_for_scans);
        let worker_handle = thread::Builder::new()
            .name("listener-worker".to_string())
            .spawn(move || worker.run(consumer))?;

        tracing::info!(
            source = source.name(),
            wake_phrase = %self.config.wake_phrase,
            chunk_samples = self.config.chunk_samples,
            "listener starting"
        );

        if let Err(e) = source.start(producer) {
            control.stop();
            if worker_handle.join().is_err() {
                tracing::error!("listener worker panicked during aborted start");
            }
            return Err(e);
        }

        Ok(ListenerHandle {
            source,
            control,
            worker: Some(worker_handle),
            stats,
            reporter: self.error_reporter,
        })
    }
}
