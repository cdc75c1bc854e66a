//! Error types for voxgate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxgateError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Phrase table errors
    #[error("Phrase table not found at {path}")]
    PhraseTableNotFound { path: String },

    #[error("Malformed phrase table at line {line}: {message}")]
    PhraseTableMalformed { line: usize, message: String },

    #[error("Phrase \"{phrase}\" is claimed by both '{first}' and '{second}'")]
    PhraseConflict {
        phrase: String,
        first: String,
        second: String,
    },

    #[error("Phrase table contains no usable rows")]
    PhraseTableEmpty,

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Recognition errors
    #[error("Recognition model not found at {path}")]
    RecognitionModelNotFound { path: String },

    #[error("Recognition failed: {message}")]
    RecognitionFailed { message: String },

    // Action errors
    #[error("Action tool not found: {tool}")]
    ActionToolNotFound { tool: String },

    #[error("Action failed: {message}")]
    ActionFailed { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VoxgateError>;
