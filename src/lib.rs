//! voxgate - Wake-word voice commands
//!
//! Listens continuously, arms on a spoken wake phrase, captures the command
//! that follows, recognizes it offline and runs the matching action.

// Enforce error handling discipline: propagate, don't panic
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod commands;
pub mod config;
pub mod defaults;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod stt;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core traits (source → recognize → act)
pub use audio::beep::Acknowledger;
pub use audio::source::SampleSource;
pub use commands::{CommandExecutor, SystemCommandExecutor};
pub use pipeline::sink::{CollectorSink, ConsoleSink, EventSink};
pub use stt::recognizer::Recognizer;

// Listener
pub use pipeline::orchestrator::{Listener, ListenerConfig, ListenerHandle};
pub use pipeline::types::ListenerEvent;

// Commands
pub use commands::{Action, ActionDispatcher, CommandResolver, DispatchOutcome, PhraseTable};

// Error handling
pub use error::{Result, VoxgateError};

// Config
pub use config::Config;

// Stage error reporting (for embedding)
pub use pipeline::error::{ErrorReporter, StageError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
