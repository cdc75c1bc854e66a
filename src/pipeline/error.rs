//! Error types and reporting for listener stages.

use std::fmt;

/// Errors that can occur inside a listener stage.
#[derive(Debug, Clone)]
pub enum StageError {
    /// Recoverable error; the stage keeps running.
    Recoverable(String),
    /// Fatal error; the listener shuts down.
    Fatal(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

impl StageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Fatal(_))
    }
}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, stage: &str, error: &StageError);
}

/// Reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => tracing::warn!(stage, "{}", msg),
            StageError::Fatal(msg) => tracing::error!(stage, "{}", msg),
        }
    }
}
