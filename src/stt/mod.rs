//! Speech-to-text: the recognizer seam, the Whisper engine and the
//! fault-containing adapter the listener calls.

pub mod adapter;
pub mod recognizer;
pub mod whisper;

pub use adapter::RecognitionAdapter;
pub use recognizer::{MockRecognizer, MockReply, RecognitionProfile, Recognizer};
pub use whisper::{WhisperConfig, WhisperRecognizer};
