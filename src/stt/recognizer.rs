use crate::error::{Result, VoxgateError};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Quality/latency trade-off for a recognition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionProfile {
    /// Wake-word scans: greedy decoding, lowest latency.
    Fast,
    /// Command finalization: beam search, best accuracy.
    Accurate,
}

impl fmt::Display for RecognitionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionProfile::Fast => f.write_str("fast"),
            RecognitionProfile::Accurate => f.write_str("accurate"),
        }
    }
}

/// Trait for speech-to-text engines.
///
/// This trait allows swapping implementations (real Whisper vs mock).
pub trait Recognizer: Send + Sync {
    /// Recognize 16kHz mono samples in [-1.0, 1.0].
    fn recognize(&self, samples: &[f32], profile: RecognitionProfile) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

/// Implement Recognizer for Arc<T> so one model can serve several owners.
impl<T: Recognizer> Recognizer for Arc<T> {
    fn recognize(&self, samples: &[f32], profile: RecognitionProfile) -> Result<String> {
        (**self).recognize(samples, profile)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// One scripted reply of [`MockRecognizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    Fail,
    Panic,
}

/// Mock recognizer for testing.
///
/// Each profile has a queue of scripted replies; when the queue is empty the
/// profile's default response is used.
#[derive(Debug, Default)]
pub struct MockRecognizer {
    fast_default: Option<String>,
    accurate_default: Option<String>,
    fast_script: Mutex<VecDeque<MockReply>>,
    accurate_script: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<(RecognitionProfile, usize)>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default reply for a profile once its script runs out.
    pub fn with_response(mut self, profile: RecognitionProfile, text: &str) -> Self {
        match profile {
            RecognitionProfile::Fast => self.fast_default = Some(text.to_string()),
            RecognitionProfile::Accurate => self.accurate_default = Some(text.to_string()),
        }
        self
    }

    /// Queue replies for a profile, consumed one per call.
    pub fn with_script(
        self,
        profile: RecognitionProfile,
        replies: impl IntoIterator<Item = MockReply>,
    ) -> Self {
        self.script(profile).extend(replies);
        self
    }

    /// Fail every call of a profile.
    pub fn with_failure(mut self, profile: RecognitionProfile) -> Self {
        match profile {
            RecognitionProfile::Fast => self.fast_default = None,
            RecognitionProfile::Accurate => self.accurate_default = None,
        }
        self
    }

    /// Profiles and sample counts of every call so far.
    pub fn calls(&self) -> Vec<(RecognitionProfile, usize)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn script(&self, profile: RecognitionProfile) -> std::sync::MutexGuard<'_, VecDeque<MockReply>> {
        let script = match profile {
            RecognitionProfile::Fast => &self.fast_script,
            RecognitionProfile::Accurate => &self.accurate_script,
        };
        script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Recognizer for MockRecognizer {
    fn recognize(&self, samples: &[f32], profile: RecognitionProfile) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((profile, samples.len()));

        let scripted = self.script(profile).pop_front();
        let default = match profile {
            RecognitionProfile::Fast => self.fast_default.clone(),
            RecognitionProfile::Accurate => self.accurate_default.clone(),
        };
        let reply = scripted.unwrap_or_else(|| default.map_or(MockReply::Fail, MockReply::Text));

        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail => Err(VoxgateError::RecognitionFailed {
                message: "mock recognition failure".to_string(),
            }),
            MockReply::Panic => panic!("mock recognizer panic"),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Resolve a model setting to a file: an existing path is used as is,
/// otherwise it names `ggml-<name>.bin` in the local or cache models directory.
pub fn resolve_model_path(model: &str) -> std::path::PathBuf {
    let direct = std::path::PathBuf::from(model);
    if direct.exists() || model.ends_with(".bin") {
        return direct;
    }
    let filename = format!("ggml-{}.bin", model);
    let local = std::path::PathBuf::from("models").join(&filename);
    if local.exists() {
        return local;
    }
    dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("voxgate")
        .join("models")
        .join(filename)
}
