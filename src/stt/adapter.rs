//! Recognition boundary used by the listener.
//!
//! Wraps a [`Recognizer`] so that engine errors and panics never reach the
//! worker: every failure becomes "no result" and is logged.

use crate::stt::recognizer::{RecognitionProfile, Recognizer};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Whisper markers that carry no words.
const NON_SPEECH_MARKERS: &[&str] = &[
    "[BLANK_AUDIO]",
    "[INAUDIBLE]",
    "[MUSIC]",
    "[NOISE]",
    "[SILENCE]",
    "(BLANK_AUDIO)",
    "(inaudible)",
    "(silence)",
];

#[derive(Clone)]
pub struct RecognitionAdapter {
    recognizer: Arc<dyn Recognizer>,
}

impl RecognitionAdapter {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    pub fn model_name(&self) -> &str {
        self.recognizer.model_name()
    }

    /// Recognize samples. Returns `None` for empty audio, empty text,
    /// engine errors and engine panics.
    pub fn recognize(&self, samples: &[f32], profile: RecognitionProfile) -> Option<String> {
        if samples.is_empty() {
            return None;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.recognizer.recognize(samples, profile)
        }));
        match outcome {
            Ok(Ok(text)) => {
                let cleaned = clean_transcript(&text);
                if cleaned.is_empty() { None } else { Some(cleaned) }
            }
            Ok(Err(e)) => {
                tracing::warn!(%profile, "recognition failed: {}", e);
                None
            }
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic");
                tracing::error!(%profile, "recognizer panicked: {msg}");
                None
            }
        }
    }
}

/// Remove non-speech markers and collapse whitespace.
pub fn clean_transcript(text: &str) -> String {
    let mut cleaned = text.to_string();
    for marker in NON_SPEECH_MARKERS {
        cleaned = cleaned.replace(marker, " ");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::recognizer::{MockRecognizer, MockReply};
    use RecognitionProfile::{Accurate, Fast};

    fn adapter(recognizer: MockRecognizer) -> RecognitionAdapter {
        RecognitionAdapter::new(Arc::new(recognizer))
    }

    #[test]
    fn test_passes_text_through() {
        let adapter = adapter(MockRecognizer::new().with_response(Accurate, "  open youtube "));
        assert_eq!(
            adapter.recognize(&[0.1; 100], Accurate),
            Some("open youtube".to_string())
        );
    }

    #[test]
    fn test_error_becomes_none() {
        let adapter = adapter(MockRecognizer::new());
        assert_eq!(adapter.recognize(&[0.1; 100], Fast), None);
    }

    #[test]
    fn test_panic_becomes_none() {
        let adapter = adapter(MockRecognizer::new().with_script(Fast, [MockReply::Panic]));
        assert_eq!(adapter.recognize(&[0.1; 100], Fast), None);
    }

    #[test]
    fn test_recovers_after_panic() {
        let adapter = adapter(
            MockRecognizer::new()
                .with_response(Fast, "garmin")
                .with_script(Fast, [MockReply::Panic]),
        );
        assert_eq!(adapter.recognize(&[0.1; 10], Fast), None);
        assert_eq!(adapter.recognize(&[0.1; 10], Fast), Some("garmin".to_string()));
    }

    #[test]
    fn test_empty_audio_skips_engine() {
        let recognizer = Arc::new(MockRecognizer::new().with_response(Fast, "x"));
        let adapter = RecognitionAdapter::new(recognizer.clone());
        assert_eq!(adapter.recognize(&[], Fast), None);
        assert!(recognizer.calls().is_empty());
    }

    #[test]
    fn test_blank_audio_is_no_result() {
        let adapter = adapter(MockRecognizer::new().with_response(Accurate, "[BLANK_AUDIO]"));
        assert_eq!(adapter.recognize(&[0.0; 100], Accurate), None);
    }

    #[test]
    fn test_clean_transcript() {
        assert_eq!(clean_transcript("Hello [BLANK_AUDIO] world"), "Hello world");
        assert_eq!(clean_transcript("(silence)"), "");
        assert_eq!(clean_transcript("  open\tgoogle \n"), "open google");
    }
}
