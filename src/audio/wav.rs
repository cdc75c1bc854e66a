//! WAV file sample source for replaying recordings through the listener.

use crate::audio::source::SampleSource;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoxgateError};
use crate::pipeline::queue::ChunkProducer;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Samples handed to the producer per push. Any size works; the producer
/// cuts chunks itself.
const FEED_BLOCK: usize = 1600;

/// Sample source that replays WAV data.
/// Supports integer and float WAVs with any channel count and sample rate,
/// converted to 16kHz mono f32.
pub struct WavSampleSource {
    samples: Arc<Vec<f32>>,
    stop_flag: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl WavSampleSource {
    /// Create from any reader.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let wav_reader = hound::WavReader::new(reader).map_err(|e| VoxgateError::AudioCapture {
            message: format!("Failed to parse WAV file: {}", e),
        })?;
        let samples = decode(wav_reader)?;
        Ok(Self::from_samples(samples))
    }

    /// Open a WAV file on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| VoxgateError::AudioCapture {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)))
    }

    /// Wrap samples that are already 16kHz mono.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples: Arc::new(samples),
            stop_flag: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }
    }

    /// Duration of the decoded audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        crate::defaults::samples_to_ms(self.samples.len(), SAMPLE_RATE)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

fn decode<R: Read>(mut wav_reader: hound::WavReader<R>) -> Result<Vec<f32>> {
    let spec = wav_reader.spec();
    if spec.channels == 0 {
        return Err(VoxgateError::AudioFormatMismatch {
            expected: "at least one channel".to_string(),
            actual: "0 channels".to_string(),
        });
    }

    let read_error = |e: hound::Error| VoxgateError::AudioCapture {
        message: format!("Failed to read WAV samples: {}", e),
    };

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(read_error)?
        }
    };

    let mono = downmix(&interleaved, usize::from(spec.channels));
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Average interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}

impl SampleSource for WavSampleSource {
    fn start(&mut self, mut producer: ChunkProducer) -> Result<()> {
        let samples = Arc::clone(&self.samples);
        let stop_flag = Arc::clone(&self.stop_flag);
        stop_flag.store(false, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("wav-feeder".to_string())
            .spawn(move || {
                for block in samples.chunks(FEED_BLOCK) {
                    if stop_flag.load(Ordering::SeqCst) || producer.is_closed() {
                        return;
                    }
                    producer.push_samples(block);
                }
                producer.end_of_stream();
            })
            .map_err(|e| VoxgateError::AudioCapture {
                message: format!("Failed to spawn WAV feeder: {}", e),
            })?;
        self.feeder = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.feeder.take()
            && handle.join().is_err()
        {
            tracing::warn!("WAV feeder thread panicked");
        }
        Ok(())
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "wav"
    }
}
