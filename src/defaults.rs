//! Default configuration constants for voxgate.
//!
//! Shared by the config file defaults, the segmenter and the tests so the
//! timing rules stay in one place.

/// Audio sample rate in Hz.
///
/// The recognition boundary is fixed at 16kHz mono.
pub const SAMPLE_RATE: u32 = 16000;

/// Duration of one captured chunk in milliseconds.
pub const CHUNK_MS: u32 = 500;

/// Number of chunks the capture queue holds before it starts dropping the oldest.
pub const QUEUE_CAPACITY: usize = 64;

/// Mean absolute amplitude above which a chunk counts as speech.
pub const VAD_THRESHOLD: f32 = 0.01;

/// Default activation phrase.
pub const WAKE_PHRASE: &str = "garmin";

/// Look-back window scanned for the wake phrase.
pub const CONTEXT_MS: u32 = 3000;

/// Audio that must arrive between two wake-word scans.
pub const SCAN_INTERVAL_MS: u32 = 500;

/// Minimum rolling context before a scan is worth running.
pub const MIN_SCAN_MS: u32 = 1000;

/// Tail of the scanned window that seeds the command buffer.
///
/// Keeps the start of an utterance spoken straight after the wake phrase.
pub const ONSET_MS: u32 = 1000;

/// Grace period after wake confirmation during which silence is not evaluated.
pub const GRACE_MS: u32 = 1500;

/// Silence run that ends a command.
pub const PAUSE_MS: u32 = 1000;

/// Commands shorter than this are never finalized by silence.
pub const MIN_COMMAND_MS: u32 = 1000;

/// Hard ceiling on command length; reaching it forces finalization.
pub const MAX_COMMAND_MS: u32 = 15000;

/// Recognition language.
pub const LANGUAGE: &str = "en";

/// Default Whisper model.
pub const MODEL: &str = "tiny.en";

/// Minimum similarity score (0-100) for a phrase match to count.
pub const RESOLVE_THRESHOLD: u8 = 70;

/// Default phrase table file name, resolved next to the config file.
pub const PHRASES_FILE: &str = "commands.csv";

/// Acknowledgment tone: frequency, length and amplitude.
pub const BEEP_HZ: f32 = 1000.0;
pub const BEEP_MS: u32 = 200;
pub const BEEP_AMPLITUDE: f32 = 0.3;

/// Convert a duration in milliseconds to a sample count at `sample_rate`.
pub const fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Convert a sample count at `sample_rate` to milliseconds.
pub const fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    samples as u64 * 1000 / sample_rate as u64
}

/// Report the GPU backend compiled into this build.
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else {
        "CPU"
    }
}
