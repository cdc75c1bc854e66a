//! Terminal rendering of listener events.

use crate::commands::DispatchOutcome;
use crate::pipeline::types::ListenerEvent;

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Clear the current terminal line.
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// One console line for `event`, or `None` for events with no user-facing line.
pub fn format_event(event: &ListenerEvent) -> Option<String> {
    let line = match event {
        ListenerEvent::Listening => {
            format!("{DIM}Listening for the wake phrase... (Ctrl-C to stop){RESET}")
        }
        ListenerEvent::WakeDetected { .. } => {
            format!("{CYAN}{BOLD}Wake word detected.{RESET} Listening for a command...")
        }
        ListenerEvent::CommandCaptured {
            duration_ms,
            reason,
        } => {
            let seconds = *duration_ms as f64 / 1000.0;
            format!("{DIM}Captured {seconds:.1}s ({reason}){RESET}")
        }
        ListenerEvent::NoSpeech => format!("{YELLOW}Didn't catch that.{RESET}"),
        ListenerEvent::Transcribed { text } => format!("You said: {BOLD}{text}{RESET}"),
        ListenerEvent::Resolved { command, score } => {
            format!("{DIM}Matched {command} ({score}%){RESET}")
        }
        ListenerEvent::Dispatched(outcome) => match outcome {
            DispatchOutcome::Executed { description, .. } => {
                format!("{GREEN}{description}{RESET}")
            }
            DispatchOutcome::Unrecognized => format!("{YELLOW}Command not recognized.{RESET}"),
            DispatchOutcome::Unbound { command } => {
                format!("{YELLOW}No action is bound to {command}.{RESET}")
            }
            DispatchOutcome::Failed { command, message } => {
                format!("{RED}{command} failed: {message}{RESET}")
            }
        },
        ListenerEvent::ChunksDropped { total } => {
            format!("{YELLOW}Audio is arriving faster than it is processed ({total} chunks dropped){RESET}")
        }
        ListenerEvent::Stopped => return None,
    };
    Some(line)
}

/// Render a listener event to stderr.
pub fn render_event(event: &ListenerEvent) {
    if let Some(line) = format_event(event) {
        clear_line();
        eprintln!("{line}");
    }
}
