//! Audio ingestion: sample sources, voice activity detection and the
//! rolling look-back window used for wake-word scanning.

pub mod beep;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod rolling;
pub mod source;
pub mod vad;
pub mod wav;

pub use beep::{Acknowledger, SilentAcknowledger};
pub use rolling::{RollingContext, RollingContextBuffer, Snapshot};
pub use source::{MockSampleSource, SampleSource};
pub use vad::{SpeechDetector, is_speech, mean_abs_amplitude};
pub use wav::WavSampleSource;
