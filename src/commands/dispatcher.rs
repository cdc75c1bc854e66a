//! Action dispatch: from a resolved command identifier to a side effect.

use crate::error::{Result, VoxgateError};
use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// What a command does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Open a URL in the default browser.
    OpenUrl { url: String },
    /// Launch a program.
    Run {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Announce the local time.
    Time,
}

/// Built-in bindings for the bundled phrase table.
pub fn default_actions() -> BTreeMap<String, Action> {
    let mut actions = BTreeMap::new();
    actions.insert(
        "open_youtube".to_string(),
        Action::OpenUrl {
            url: "https://www.youtube.com".to_string(),
        },
    );
    actions.insert(
        "open_google".to_string(),
        Action::OpenUrl {
            url: "https://www.google.com".to_string(),
        },
    );
    actions.insert(
        "open_notepad".to_string(),
        Action::Run {
            program: default_editor().to_string(),
            args: Vec::new(),
        },
    );
    actions.insert(
        "open_calculator".to_string(),
        Action::Run {
            program: default_calculator().to_string(),
            args: Vec::new(),
        },
    );
    actions.insert("tell_time".to_string(), Action::Time);
    actions
}

fn default_editor() -> &'static str {
    if cfg!(target_os = "windows") {
        "notepad"
    } else if cfg!(target_os = "macos") {
        "TextEdit"
    } else {
        "gedit"
    }
}

fn default_calculator() -> &'static str {
    if cfg!(target_os = "windows") {
        "calc"
    } else if cfg!(target_os = "macos") {
        "Calculator"
    } else {
        "gnome-calculator"
    }
}

/// Program and arguments that open `url` with the desktop's default handler.
fn url_opener(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        (
            "cmd",
            vec!["/C".into(), "start".into(), String::new(), url.into()],
        )
    } else if cfg!(target_os = "macos") {
        ("open", vec![url.into()])
    } else {
        ("xdg-open", vec![url.into()])
    }
}

/// Program and arguments that launch an application by name.
fn app_launcher(program: &str, args: &[String]) -> (String, Vec<String>) {
    if cfg!(target_os = "macos") && !program.contains('/') && args.is_empty() {
        ("open".to_string(), vec!["-a".to_string(), program.to_string()])
    } else {
        (program.to_string(), args.to_vec())
    }
}

/// Trait for launching external programs, so dispatch can be tested without side effects.
pub trait CommandExecutor: Send + Sync {
    /// Start `program` without waiting for it to exit.
    fn launch(&self, program: &str, args: &[String]) -> Result<()>;
}

/// Production executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn launch(&self, program: &str, args: &[String]) -> Result<()> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VoxgateError::ActionToolNotFound {
                        tool: program.to_string(),
                    }
                } else {
                    VoxgateError::ActionFailed {
                        message: format!("Failed to execute {}: {}", program, e),
                    }
                }
            })?;

        // Reap the child so it does not linger as a zombie.
        std::thread::spawn(move || {
            if let Err(e) = child.wait() {
                tracing::debug!("failed to wait for launched program: {}", e);
            }
        });
        Ok(())
    }
}

/// What a dispatched command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The action ran; `description` is a short human-readable summary.
    Executed { command: String, description: String },
    /// The command resolved but has no action bound to it.
    Unbound { command: String },
    /// No command matched the utterance.
    Unrecognized,
    /// The action was attempted and failed.
    Failed { command: String, message: String },
}

type TimeSource = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

pub struct ActionDispatcher {
    actions: BTreeMap<String, Action>,
    executor: Arc<dyn CommandExecutor>,
    now: TimeSource,
}

impl ActionDispatcher {
    pub fn new(actions: BTreeMap<String, Action>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            actions,
            executor,
            now: Arc::new(|| Local::now().time()),
        }
    }

    /// Replace the clock used by [`Action::Time`].
    pub fn with_time_source(mut self, now: impl Fn() -> NaiveTime + Send + Sync + 'static) -> Self {
        self.now = Arc::new(now);
        self
    }

    pub fn action(&self, command: &str) -> Option<&Action> {
        self.actions.get(command)
    }

    /// Run the action bound to `command`. `None` means nothing resolved.
    pub fn dispatch(&self, command: Option<&str>) -> DispatchOutcome {
        let Some(command) = command else {
            return DispatchOutcome::Unrecognized;
        };
        let Some(action) = self.actions.get(command) else {
            tracing::warn!(command, "no action bound to command");
            return DispatchOutcome::Unbound {
                command: command.to_string(),
            };
        };

        match self.run(action) {
            Ok(description) => {
                tracing::info!(command, "{}", description);
                DispatchOutcome::Executed {
                    command: command.to_string(),
                    description,
                }
            }
            Err(e) => {
                tracing::warn!(command, "action failed: {}", e);
                DispatchOutcome::Failed {
                    command: command.to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn run(&self, action: &Action) -> Result<String> {
        match action {
            Action::OpenUrl { url } => {
                let (program, args) = url_opener(url);
                self.executor.launch(program, &args)?;
                Ok(format!("Opening {}", url))
            }
            Action::Run { program, args } => {
                let (program, args) = app_launcher(program, args);
                self.executor.launch(&program, &args)?;
                Ok(format!("Launching {}", program))
            }
            Action::Time => Ok(format!("The time is {}", (self.now)().format("%H:%M"))),
        }
    }
}
