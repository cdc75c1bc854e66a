//! Audible acknowledgement played when the wake word is confirmed.

use crate::defaults;

/// Signals the user that the wake word was heard.
///
/// Implementations must return promptly; the listener calls this from its
/// worker thread between chunks.
pub trait Acknowledger: Send + Sync {
    fn acknowledge(&self);
}

/// Does nothing. Used for replay, `--no-beep` and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAcknowledger;

impl Acknowledger for SilentAcknowledger {
    fn acknowledge(&self) {
        tracing::debug!("wake acknowledged");
    }
}

/// A sine tone with short linear fades so it starts and stops without clicks.
pub fn tone_samples(sample_rate: u32, frequency: f32, duration_ms: u32, amplitude: f32) -> Vec<f32> {
    let len = defaults::ms_to_samples(duration_ms, sample_rate);
    let fade = (len / 20).max(1);
    let step = std::f32::consts::TAU * frequency / sample_rate as f32;
    (0..len)
        .map(|i| {
            let envelope = if i < fade {
                i as f32 / fade as f32
            } else if i + fade > len {
                (len - i) as f32 / fade as f32
            } else {
                1.0
            };
            amplitude * envelope * (step * i as f32).sin()
        })
        .collect()
}

#[cfg(feature = "cpal-audio")]
pub use tone::ToneAcknowledger;

#[cfg(feature = "cpal-audio")]
mod tone {
    use super::{Acknowledger, tone_samples};
    use crate::defaults;
    use crate::error::{Result, VoxgateError};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Plays a short tone on the default output device.
    ///
    /// Each acknowledgement plays on its own detached thread, so a missing or
    /// slow output device never stalls the listener.
    #[derive(Debug, Clone)]
    pub struct ToneAcknowledger {
        frequency: f32,
        duration_ms: u32,
        amplitude: f32,
    }

    impl Default for ToneAcknowledger {
        fn default() -> Self {
            Self {
                frequency: defaults::BEEP_HZ,
                duration_ms: defaults::BEEP_MS,
                amplitude: defaults::BEEP_AMPLITUDE,
            }
        }
    }

    impl ToneAcknowledger {
        pub fn new() -> Self {
            Self::default()
        }

        fn play(&self) -> Result<()> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| VoxgateError::AudioDeviceNotFound {
                    device: "default output".to_string(),
                })?;
            let supported = device
                .default_output_config()
                .map_err(|e| VoxgateError::AudioCapture {
                    message: format!("Failed to query output config: {}", e),
                })?;
            let rate = supported.sample_rate().0;
            let channels = usize::from(supported.channels());
            let config: cpal::StreamConfig = supported.into();

            let samples = Arc::new(tone_samples(
                rate,
                self.frequency,
                self.duration_ms,
                self.amplitude,
            ));
            let position = Arc::new(AtomicUsize::new(0));
            let finished = Arc::new(AtomicBool::new(false));

            let stream = {
                let samples = Arc::clone(&samples);
                let position = Arc::clone(&position);
                let finished = Arc::clone(&finished);
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            for frame in data.chunks_mut(channels.max(1)) {
                                let pos = position.fetch_add(1, Ordering::Relaxed);
                                let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                    finished.store(true, Ordering::Relaxed);
                                    0.0
                                });
                                frame.fill(sample);
                            }
                        },
                        |err| tracing::warn!("beep playback error: {}", err),
                        None,
                    )
                    .map_err(|e| VoxgateError::AudioCapture {
                        message: format!("Failed to open output stream: {}", e),
                    })?
            };
            stream.play().map_err(|e| VoxgateError::AudioCapture {
                message: format!("Failed to play beep: {}", e),
            })?;

            let deadline = Instant::now() + Duration::from_millis(u64::from(self.duration_ms) + 500);
            while !finished.load(Ordering::Relaxed) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        }
    }

    impl Acknowledger for ToneAcknowledger {
        fn acknowledge(&self) {
            let tone = self.clone();
            let spawned = std::thread::Builder::new()
                .name("beep".to_string())
                .spawn(move || {
                    if let Err(e) = tone.play() {
                        tracing::warn!("could not play wake beep: {}", e);
                    }
                });
            if let Err(e) = spawned {
                tracing::warn!("could not spawn beep thread: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_length_matches_duration() {
        let tone = tone_samples(16000, 1000.0, 200, 0.3);
        assert_eq!(tone.len(), 3200);
    }

    #[test]
    fn test_tone_respects_amplitude() {
        let tone = tone_samples(16000, 1000.0, 200, 0.3);
        let peak = tone.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= 0.3 + 1e-6);
        assert!(peak > 0.25);
    }

    #[test]
    fn test_tone_fades_in_and_out() {
        let tone = tone_samples(16000, 1000.0, 200, 0.3);
        assert_eq!(tone[0], 0.0);
        assert!(tone[tone.len() - 1].abs() < 0.01);
    }

    #[test]
    fn test_zero_duration_is_empty() {
        assert!(tone_samples(16000, 1000.0, 0, 0.3).is_empty());
    }

    #[test]
    fn test_silent_acknowledger_is_callable() {
        let ack: Box<dyn Acknowledger> = Box::new(SilentAcknowledger);
        ack.acknowledge();
    }
}
