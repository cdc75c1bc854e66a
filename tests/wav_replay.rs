//! WAV files replayed through the listener.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use voxgate::audio::WavSampleSource;
use voxgate::commands::{
    ActionDispatcher, CommandExecutor, CommandResolver, DispatchOutcome, default_actions,
};
use voxgate::pipeline::{CollectorSink, FinalizeReason, ListenerEvent, OverflowPolicy};
use voxgate::stt::{MockRecognizer, RecognitionProfile};
use voxgate::{Listener, ListenerConfig, PhraseTable, Recognizer};

struct NullExecutor;

impl CommandExecutor for NullExecutor {
    fn launch(&self, _program: &str, _args: &[String]) -> voxgate::Result<()> {
        Ok(())
    }
}

/// Write `segments` of (seconds, amplitude) as a 16-bit WAV.
fn write_wav(path: &Path, sample_rate: u32, channels: u16, segments: &[(f32, f32)]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &(seconds, amplitude) in segments {
        let frames = (seconds * sample_rate as f32) as usize;
        for i in 0..frames {
            // Square wave keeps the mean absolute amplitude at `amplitude`.
            let sign = if (i / 8) % 2 == 0 { 1.0 } else { -1.0 };
            let value = (sign * amplitude * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
    }
    writer.finalize().unwrap();
}

/// Takes its time over wake scans and keeps every command it is given.
///
/// Hears the wake phrase in any window holding loud (0.7) audio.
#[derive(Default)]
struct SlowRecognizer {
    commands: Mutex<Vec<Vec<f32>>>,
}

impl Recognizer for SlowRecognizer {
    fn recognize(&self, samples: &[f32], profile: RecognitionProfile) -> voxgate::Result<String> {
        match profile {
            RecognitionProfile::Fast => {
                std::thread::sleep(Duration::from_millis(200));
                let loud = samples.iter().any(|s| s.abs() > 0.6);
                Ok(if loud { "garmin" } else { "" }.to_string())
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

fn count_near(samples: &[f32], amplitude: f32) -> usize {
    samples
        .iter()
        .filter(|s| (s.abs() - amplitude).abs() < 0.05)
        .count()
}

fn replay(path: &Path, recognizer: impl Recognizer + 'static) -> (Vec<ListenerEvent>, u64) {
    let table = PhraseTable::from_pairs([
        ("open_youtube", "open youtube"),
        ("tell_time", "what time is it"),
    ])
    .unwrap();
    let sink = CollectorSink::new();
    let config = ListenerConfig {
        overflow: OverflowPolicy::Block,
        wait_for_scans: true,
        ..ListenerConfig::default()
    };

    let handle = Listener::new(config)
        .start(
            Box::new(WavSampleSource::open(path).unwrap()),
            Arc::new(recognizer),
            CommandResolver::with_defaults(&table),
            ActionDispatcher::new(default_actions(), Arc::new(NullExecutor)),
            Box::new(sink.clone()),
        )
        .unwrap();
    assert!(handle.is_finite());
    let stats = handle.wait();
    (sink.events(), stats.chunks_processed)
}

#[test]
fn replayed_file_is_processed_completely() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("silence.wav");
    write_wav(&path, 16000, 1, &[(3.0, 0.0)]);

    let (events, chunks) = replay(&path, MockRecognizer::new());

    // 3s at 0.5s per chunk.
    assert_eq!(chunks, 6);
    assert_eq!(events.first(), Some(&ListenerEvent::Listening));
    assert_eq!(events.last(), Some(&ListenerEvent::Stopped));
}

#[test]
fn replayed_command_is_dispatched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("command.wav");
    write_wav(
        &path,
        16000,
        1,
        &[(1.0, 0.2), (1.5, 0.0), (1.0, 0.2), (1.0, 0.0)],
    );
    let recognizer = MockRecognizer::new()
        .with_response(RecognitionProfile::Fast, "garmin")
        .with_response(RecognitionProfile::Accurate, "what time is it");

    let (events, _) = replay(&path, recognizer);

    let outcomes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ListenerEvent::Dispatched(outcome) => Some(outcome),
            _ => None,
        })
        .collect();
    assert_eq!(outcomes.len(), 1, "events: {:?}", events);
    assert!(matches!(
        outcomes[0],
        DispatchOutcome::Executed { command, description }
            if command == "tell_time" && description.starts_with("The time is ")
    ));
}

#[test]
fn slow_wake_scan_keeps_the_audio_that_follows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slow.wav");
    // Wake phrase, grace, command, pause, then a long unrelated stretch.
    write_wav(
        &path,
        16000,
        1,
        &[
            (1.0, 0.7),
            (1.5, 0.0),
            (2.0, 0.3),
            (1.5, 0.0),
            (10.0, 0.5),
            (2.0, 0.0),
        ],
    );
    let recognizer = Arc::new(SlowRecognizer::default());

    let (events, chunks) = replay(&path, Arc::clone(&recognizer));

    assert_eq!(chunks, 36);
    let captured: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ListenerEvent::CommandCaptured {
                duration_ms,
                reason,
            } => Some((*duration_ms, *reason)),
            _ => None,
        })
        .collect();
    // Onset 1s + grace 1.5s + command 2s + pause 1s.
    assert_eq!(captured, vec![(5500, FinalizeReason::Pause)]);

    let commands = recognizer.commands.lock().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].len(), 88000);
    assert_eq!(count_near(&commands[0], 0.7), 16000);
    assert_eq!(count_near(&commands[0], 0.3), 32000);
    assert_eq!(count_near(&commands[0], 0.5), 0);
}

#[test]
fn stereo_file_at_other_rate_is_converted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stereo.wav");
    write_wav(&path, 48000, 2, &[(2.0, 0.0)]);

    let source = WavSampleSource::open(&path).unwrap();
    assert_eq!(source.samples().len(), 32000);
    assert_eq!(source.duration_ms(), 2000);

    let (_, chunks) = replay(&path, MockRecognizer::new());
    assert_eq!(chunks, 4);
}

#[test]
fn missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(WavSampleSource::open(&dir.path().join("nope.wav")).is_err());
}
