//! The processing loop.
//!
//! Consumes queued chunks strictly in arrival order, merges wake-scan results
//! as they arrive, and runs command recognition, resolution and dispatch
//! synchronously. Chunks that arrive while a command is being handled wait in
//! the queue.
//!
//! Input that is not real-time (a file) is processed in lockstep with the
//! wake scanner: no chunk is read while a scan is pending, so every chunk
//! lands exactly where it would have if recognition were instantaneous.

use crate::audio::beep::Acknowledger;
use crate::commands::{ActionDispatcher, CommandResolver};
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::queue::ChunkConsumer;
use crate::pipeline::scanner::WakeScanner;
use crate::pipeline::segmenter::{Segmenter, SegmenterAction};
use crate::pipeline::sink::EventSink;
use crate::pipeline::stats::ListenerStats;
use crate::pipeline::types::{
    AudioChunk, CapturedCommand, FinalizeReason, ListenerEvent, ListenerState, QueueItem,
    ScanOutcome,
};
use crate::stt::{RecognitionAdapter, RecognitionProfile};
use crossbeam_channel::select;
use std::sync::Arc;

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Finite input drained; pending work was completed.
    Drained,
    /// Stop requested; pending work was abandoned.
    Stopped,
}

pub struct Worker {
    segmenter: Segmenter,
    scanner: Option<WakeScanner>,
    adapter: RecognitionAdapter,
    resolver: CommandResolver,
    dispatcher: ActionDispatcher,
    acknowledger: Arc<dyn Acknowledger>,
    sink: Box<dyn EventSink>,
    reporter: Arc<dyn ErrorReporter>,
    stats: Arc<ListenerStats>,
    last_dropped: u64,
    wait_for_scans: bool,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        segmenter: Segmenter,
        scanner: WakeScanner,
        adapter: RecognitionAdapter,
        resolver: CommandResolver,
        dispatcher: ActionDispatcher,
        acknowledger: Arc<dyn Acknowledger>,
        sink: Box<dyn EventSink>,
        reporter: Arc<dyn ErrorReporter>,
        stats: Arc<ListenerStats>,
    ) -> Self {
        Self {
            segmenter,
            scanner: Some(scanner),
            adapter,
            resolver,
            dispatcher,
            acknowledger,
            sink,
            reporter,
            stats,
            last_dropped: 0,
            wait_for_scans: false,
        }
    }

    /// Block on a pending scan before reading the next chunk.
    pub fn with_wait_for_scans(mut self, wait: bool) -> Self {
        self.wait_for_scans = wait;
        self
    }

    /// Run until the queue yields `EndOfStream` or `Stop`, or disconnects.
    pub fn run(mut self, consumer: ChunkConsumer) {
        self.emit(ListenerEvent::Listening);

        let exit = match self.scanner.as_ref().map(|s| s.outcomes().clone()) {
            Some(outcomes) => self.process(&consumer, &outcomes),
            None => Exit::Stopped,
        };
        tracing::debug!(?exit, "worker loop finished");
        drop(consumer);

        if let Some(scanner) = self.scanner.take()
            && let Err(msg) = scanner.shutdown()
        {
            self.reporter.report(
                "scanner",
                &StageError::Fatal(format!("wake scanner panicked: {msg}")),
            );
        }
        self.emit(ListenerEvent::Stopped);
    }

    fn process(
        &mut self,
        consumer: &ChunkConsumer,
        outcomes: &crossbeam_channel::Receiver<ScanOutcome>,
    ) -> Exit {
        let chunks = consumer.receiver();
        loop {
            if self.wait_for_scans && self.segmenter.state() == ListenerState::ScanPending {
                match outcomes.recv() {
                    Ok(outcome) => {
                        self.on_scan_outcome(&outcome);
                        continue;
                    }
                    Err(_) => {
                        self.reporter.report(
                            "scanner",
                            &StageError::Fatal("wake scanner exited".to_string()),
                        );
                        self.segmenter.reset();
                        return Exit::Stopped;
                    }
                }
            }
            select! {
                recv(chunks) -> item => match item {
                    Ok(QueueItem::Chunk(chunk)) => {
                        self.on_chunk(&chunk);
                        self.check_dropped(consumer.dropped());
                    }
                    Ok(QueueItem::EndOfStream) => {
                        self.drain(outcomes);
                        return Exit::Drained;
                    }
                    Ok(QueueItem::Stop) => {
                        // Stop may have evicted a chunk on its way in.
                        self.check_dropped(consumer.dropped());
                        self.segmenter.reset();
                        return Exit::Stopped;
                    }
                    Err(_) => {
                        self.reporter.report(
                            "worker",
                            &StageError::Recoverable("chunk queue closed".to_string()),
                        );
                        self.segmenter.reset();
                        return Exit::Stopped;
                    }
                },
                recv(outcomes) -> outcome => match outcome {
                    Ok(outcome) => self.on_scan_outcome(&outcome),
                    Err(_) => {
                        self.reporter.report(
                            "scanner",
                            &StageError::Fatal("wake scanner exited".to_string()),
                        );
                        self.segmenter.reset();
                        return Exit::Stopped;
                    }
                },
            }
        }
    }

    /// Finite input ended: wait for a scan in flight, then close any command
    /// long enough to keep.
    fn drain(&mut self, outcomes: &crossbeam_channel::Receiver<ScanOutcome>) {
        while self.segmenter.state() == ListenerState::ScanPending {
            match outcomes.recv() {
                Ok(outcome) => self.on_scan_outcome(&outcome),
                Err(_) => {
                    self.segmenter.reset();
                    break;
                }
            }
        }
        match self.segmenter.flush() {
            Some(command) => self.finalize(command),
            None => tracing::debug!("input ended with no command in progress"),
        }
    }

    fn on_chunk(&mut self, chunk: &AudioChunk) {
        self.stats.record_chunk();
        if let Some(action) = self.segmenter.on_chunk(chunk) {
            self.perform(action);
        }
    }

    fn on_scan_outcome(&mut self, outcome: &ScanOutcome) {
        let Some(action) = self.segmenter.on_scan_outcome(outcome) else {
            return;
        };
        if outcome.detected {
            self.stats.record_wake();
            let transcript = outcome.transcript.clone().unwrap_or_default();
            tracing::info!(transcript = %transcript, "wake phrase detected");
            self.emit(ListenerEvent::WakeDetected { transcript });
        }
        self.perform(action);
    }

    fn perform(&mut self, action: SegmenterAction) {
        match action {
            SegmenterAction::Scan(request) => {
                self.stats.record_scan();
                let id = request.id;
                let submitted = self
                    .scanner
                    .as_ref()
                    .is_some_and(|scanner| scanner.submit(request));
                if !submitted {
                    self.reporter.report(
                        "scanner",
                        &StageError::Recoverable(format!("scan {id} could not be queued")),
                    );
                    // Release the segmenter as if the phrase were absent.
                    self.segmenter.on_scan_outcome(&ScanOutcome {
                        id,
                        transcript: None,
                        detected: false,
                    });
                }
            }
            SegmenterAction::Acknowledge => self.acknowledger.acknowledge(),
            SegmenterAction::Finalize(command) => self.finalize(command),
        }
    }

    fn finalize(&mut self, command: CapturedCommand) {
        let sample_rate = self.segmenter.config().sample_rate;
        let duration_ms = crate::defaults::samples_to_ms(command.samples.len(), sample_rate);
        self.stats
            .record_command(command.reason == FinalizeReason::Ceiling);
        tracing::info!(duration_ms, reason = %command.reason, "command captured");
        self.emit(ListenerEvent::CommandCaptured {
            duration_ms,
            reason: command.reason,
        });

        match self
            .adapter
            .recognize(&command.samples, RecognitionProfile::Accurate)
        {
            None => self.emit(ListenerEvent::NoSpeech),
            Some(text) => {
                self.emit(ListenerEvent::Transcribed { text: text.clone() });
                let resolution = self.resolver.resolve(&text);
                if let Some(resolution) = &resolution {
                    self.emit(ListenerEvent::Resolved {
                        command: resolution.command.clone(),
                        score: resolution.rounded_score(),
                    });
                }
                let outcome = self
                    .dispatcher
                    .dispatch(resolution.as_ref().map(|r| r.command.as_str()));
                self.emit(ListenerEvent::Dispatched(outcome));
            }
        }

        self.segmenter.complete_finalization();
    }

    fn check_dropped(&mut self, total: u64) {
        if total > self.last_dropped {
            tracing::warn!(
                dropped = total - self.last_dropped,
                total,
                "chunk queue overflowed; oldest audio discarded"
            );
            self.last_dropped = total;
            self.stats.set_dropped(total);
            self.emit(ListenerEvent::ChunksDropped { total });
        }
    }

    fn emit(&mut self, event: ListenerEvent) {
        self.sink.handle(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::beep::SilentAcknowledger;
    use crate::commands::{DispatchOutcome, PhraseTable, default_actions};
    use crate::commands::dispatcher::CommandExecutor;
    use crate::pipeline::error::LogReporter;
    use crate::pipeline::queue::{OverflowPolicy, chunk_queue};
    use crate::pipeline::scanner::WakeMatcher;
    use crate::pipeline::segmenter::SegmenterConfig;
    use crate::pipeline::sink::CollectorSink;
    use crate::stt::{MockRecognizer, Recognizer};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHUNK: usize = 8000;

    #[derive(Default)]
    struct RecordingExecutor {
        launched: Mutex<Vec<String>>,
    }

    impl CommandExecutor for RecordingExecutor {
        fn launch(&self, program: &str, args: &[String]) -> crate::error::Result<()> {
            let mut line = program.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            self.launched.lock().unwrap().push(line);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingAcknowledger(AtomicUsize);

    impl Acknowledger for CountingAcknowledger {
        fn acknowledge(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn speech() -> Vec<f32> {
        vec![0.2; CHUNK]
    }

    fn silence() -> Vec<f32> {
        vec![0.0; CHUNK]
    }

    struct Harness {
        sink: CollectorSink,
        stats: Arc<ListenerStats>,
        acks: Arc<CountingAcknowledger>,
        executor: Arc<RecordingExecutor>,
    }

    fn run_worker(recognizer: Arc<MockRecognizer>, blocks: Vec<Vec<f32>>) -> Harness {
        let recognizer: Arc<dyn Recognizer> = recognizer;
        let adapter = RecognitionAdapter::new(recognizer);
        let scanner = WakeScanner::spawn(adapter.clone(), WakeMatcher::new("garmin")).unwrap();
        let table = PhraseTable::from_pairs([
            ("open_youtube", "open youtube"),
            ("open_youtube", "youtube"),
            ("tell_time", "what time is it"),
        ])
        .unwrap();
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = ActionDispatcher::new(default_actions(), executor.clone());
        let sink = CollectorSink::new();
        let stats = Arc::new(ListenerStats::new());
        let acks = Arc::new(CountingAcknowledger::default());

        let worker = Worker::new(
            Segmenter::new(SegmenterConfig::default()),
            scanner,
            adapter,
            CommandResolver::with_defaults(&table),
            dispatcher,
            acks.clone(),
            Box::new(sink.clone()),
            Arc::new(LogReporter),
            stats.clone(),
        )
        .with_wait_for_scans(true);

        let (mut producer, consumer) = chunk_queue(64, CHUNK, OverflowPolicy::Block);
        let handle = std::thread::spawn(move || worker.run(consumer));
        for block in blocks {
            producer.push_samples(&block);
        }
        producer.end_of_stream();
        handle.join().unwrap();

        Harness {
            sink,
            stats,
            acks,
            executor,
        }
    }

    /// Answers every wake scan late and keeps the command audio it is given.
    #[derive(Default)]
    struct SlowWake {
        commands: Mutex<Vec<Vec<f32>>>,
    }

    impl Recognizer for SlowWake {
        fn recognize(
            &self,
            samples: &[f32],
            profile: RecognitionProfile,
        ) -> crate::error::Result<String> {
            match profile {
                RecognitionProfile::Fast => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    Ok("garmin".to_string())
                }
                RecognitionProfile::Accurate => {
                    self.commands.lock().unwrap().push(samples.to_vec());
                    Ok("what time is it".to_string())
                }
            }
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn slow_scan_holds_back_following_chunks() {
        let recognizer = Arc::new(SlowWake::default());
        let adapter = RecognitionAdapter::new(recognizer.clone());
        let scanner = WakeScanner::spawn(adapter.clone(), WakeMatcher::new("garmin")).unwrap();
        let table = PhraseTable::from_pairs([("tell_time", "what time is it")]).unwrap();
        let worker = Worker::new(
            Segmenter::new(SegmenterConfig::default()),
            scanner,
            adapter,
            CommandResolver::with_defaults(&table),
            ActionDispatcher::new(default_actions(), Arc::new(RecordingExecutor::default())),
            Arc::new(SilentAcknowledger),
            Box::new(CollectorSink::new()),
            Arc::new(LogReporter),
            Arc::new(ListenerStats::new()),
        )
        .with_wait_for_scans(true);

        // Every chunk carries its own value so the command can be traced back.
        let values = [0.7, 0.7, 0.0, 0.0, 0.0, 0.3, 0.3, 0.3, 0.0, 0.0];
        let (mut producer, consumer) = chunk_queue(64, CHUNK, OverflowPolicy::Block);
        for value in values {
            producer.push_samples(&vec![value; CHUNK]);
        }
        producer.end_of_stream();
        worker.run(consumer);

        let mut expected = Vec::new();
        for value in values {
            expected.extend(vec![value; CHUNK]);
        }
        let commands = recognizer.commands.lock().unwrap();
        assert_eq!(commands.as_slice(), &[expected]);
    }

    #[test]
    fn no_wake_phrase_means_no_command() {
        let recognizer = Arc::new(
            MockRecognizer::new().with_response(RecognitionProfile::Fast, "just talking"),
        );
        let harness = run_worker(recognizer.clone(), vec![speech(); 6]);

        let events = harness.sink.events();
        assert_eq!(events.first(), Some(&ListenerEvent::Listening));
        assert_eq!(events.last(), Some(&ListenerEvent::Stopped));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ListenerEvent::CommandCaptured { .. }))
        );
        assert_eq!(harness.acks.0.load(Ordering::SeqCst), 0);
        assert!(
            recognizer
                .calls()
                .iter()
                .all(|(profile, _)| *profile == RecognitionProfile::Fast)
        );
        assert_eq!(harness.stats.snapshot().chunks_processed, 6);
    }

    #[test]
    fn wake_then_command_is_dispatched_once() {
        let recognizer = Arc::new(
            MockRecognizer::new()
                .with_response(RecognitionProfile::Fast, "garmin")
                .with_response(RecognitionProfile::Accurate, "open youtube please"),
        );
        // Two chunks reach the scan threshold; then grace, speech and a pause.
        let mut blocks = vec![speech(), speech()];
        blocks.extend(vec![silence(); 3]);
        blocks.extend(vec![speech(); 2]);
        blocks.extend(vec![silence(); 2]);
        let harness = run_worker(recognizer, blocks);

        let events = harness.sink.events();
        let dispatched: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ListenerEvent::Dispatched(outcome) => Some(outcome.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(dispatched.len(), 1, "events: {:?}", events);
        assert!(matches!(
            &dispatched[0],
            DispatchOutcome::Executed { command, .. } if command == "open_youtube"
        ));
        assert!(events.contains(&ListenerEvent::Resolved {
            command: "open_youtube".to_string(),
            score: 100,
        }));
        assert_eq!(harness.acks.0.load(Ordering::SeqCst), 1);
        assert_eq!(harness.executor.launched.lock().unwrap().len(), 1);

        assert!(events.contains(&ListenerEvent::CommandCaptured {
            duration_ms: 4500,
            reason: FinalizeReason::Pause,
        }));

        let stats = harness.stats.snapshot();
        assert_eq!(stats.wake_detections, 1);
        assert_eq!(stats.commands_finalized, 1);
    }

    #[test]
    fn unrecognized_command_is_reported() {
        let recognizer = Arc::new(
            MockRecognizer::new()
                .with_response(RecognitionProfile::Fast, "garmin")
                .with_response(RecognitionProfile::Accurate, "gibberish xyz"),
        );
        let mut blocks = vec![speech(), speech()];
        blocks.extend(vec![silence(); 3]);
        blocks.extend(vec![speech(); 2]);
        blocks.extend(vec![silence(); 2]);
        let harness = run_worker(recognizer, blocks);

        let events = harness.sink.events();
        assert!(events.contains(&ListenerEvent::Dispatched(DispatchOutcome::Unrecognized)));
        assert!(harness.executor.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_command_recognition_is_no_speech() {
        let recognizer = Arc::new(
            MockRecognizer::new()
                .with_response(RecognitionProfile::Fast, "garmin")
                .with_failure(RecognitionProfile::Accurate),
        );
        let mut blocks = vec![speech(), speech()];
        blocks.extend(vec![silence(); 3]);
        blocks.extend(vec![speech(); 2]);
        blocks.extend(vec![silence(); 2]);
        let harness = run_worker(recognizer, blocks);

        let events = harness.sink.events();
        assert!(events.contains(&ListenerEvent::NoSpeech));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ListenerEvent::Dispatched(_)))
        );
        assert_eq!(events.last(), Some(&ListenerEvent::Stopped));
    }

    #[test]
    fn end_of_input_flushes_command_in_progress() {
        let recognizer = Arc::new(
            MockRecognizer::new()
                .with_response(RecognitionProfile::Fast, "garmin")
                .with_response(RecognitionProfile::Accurate, "what time is it"),
        );
        // Input ends mid-command, before any pause.
        let mut blocks = vec![speech(), speech()];
        blocks.extend(vec![speech(); 4]);
        let harness = run_worker(recognizer, blocks);

        let events = harness.sink.events();
        // Onset 1s + grace 1.5s + one recorded chunk.
        assert!(events.contains(&ListenerEvent::CommandCaptured {
            duration_ms: 3000,
            reason: FinalizeReason::EndOfStream,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            ListenerEvent::Dispatched(DispatchOutcome::Executed { command, .. }) if command == "tell_time"
        )));
    }
}
