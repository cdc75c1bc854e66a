//! Voice Activity Detection (VAD).
//!
//! Classifies a chunk as speech or silence by comparing its mean absolute
//! amplitude against a fixed threshold. Stateless: the silence run that ends
//! a command is tracked by the segmenter, not here.

use crate::defaults;

/// Mean absolute amplitude of normalized samples. Empty input is silent.
pub fn mean_abs_amplitude(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s.abs())).sum();
    (sum / samples.len() as f64) as f32
}

/// True when the chunk's mean absolute amplitude is strictly above `threshold`.
pub fn is_speech(samples: &[f32], threshold: f32) -> bool {
    mean_abs_amplitude(samples) > threshold
}

/// Detailed VAD result with level information, used for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadResult {
    pub is_speech: bool,
    /// Mean absolute amplitude of the chunk.
    pub level: f32,
    pub threshold: f32,
}

/// Energy-threshold speech detector.
#[derive(Debug, Clone, Copy)]
pub struct SpeechDetector {
    threshold: f32,
}

impl Default for SpeechDetector {
    fn default() -> Self {
        Self::new(defaults::VAD_THRESHOLD)
    }
}

impl SpeechDetector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_speech(&self, samples: &[f32]) -> bool {
        is_speech(samples, self.threshold)
    }

    pub fn classify(&self, samples: &[f32]) -> VadResult {
        let level = mean_abs_amplitude(samples);
        VadResult {
            is_speech: level > self.threshold,
            level,
            threshold: self.threshold,
        }
    }
}
