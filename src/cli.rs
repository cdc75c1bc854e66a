//! Command-line interface for voxgate
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Wake-word voice commands
#[derive(Parser, Debug)]
#[command(
    name = "voxgate",
    version,
    about = "Wake-word voice commands for the desktop"
)]
pub struct Cli {
    /// Subcommand to execute (default: listen)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status messages and all logs but errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug, -vvv: trace, plus stats at exit)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub listen: ListenArgs,
}

/// Overrides applied on top of the configuration file when listening.
#[derive(Args, Debug, Clone, Default)]
pub struct ListenArgs {
    /// Audio input device name (see `voxgate devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Whisper model name (e.g. tiny.en) or path to a ggml model file
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Phrase that arms command capture
    #[arg(long, value_name = "PHRASE")]
    pub wake_phrase: Option<String>,

    /// Minimum similarity score (0-100) for a command match
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub threshold: Option<u8>,

    /// Phrase table (command,phrase rows)
    #[arg(long, value_name = "PATH")]
    pub phrases: Option<PathBuf>,

    /// Do not play a tone when the wake phrase is heard
    #[arg(long)]
    pub no_beep: bool,

    /// Stop after this long instead of waiting for Ctrl-C (e.g. 30s, 5m)
    #[arg(long = "for", value_name = "DURATION", value_parser = parse_duration)]
    pub run_for: Option<Duration>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Listen on the microphone for the wake phrase (the default)
    Listen {
        #[command(flatten)]
        args: ListenArgs,
    },

    /// Run the listening pipeline over a WAV file
    Replay {
        /// WAV file to replay (resampled to 16kHz mono)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Phrase table (command,phrase rows)
        #[arg(long, value_name = "PATH")]
        phrases: Option<PathBuf>,

        /// Whisper model name or path
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Print the resolved command instead of running its action
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve text against the phrase table without any audio
    Resolve {
        /// Text to resolve, as a recognizer would produce it
        #[arg(value_name = "TEXT", required = true, num_args = 1..)]
        text: Vec<String>,

        /// Phrase table (command,phrase rows)
        #[arg(long, value_name = "PATH")]
        phrases: Option<PathBuf>,
    },

    /// List available audio input devices
    Devices,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse human-friendly durations: "30s", "5m", "1h 30m".
fn parse_duration(s: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_listen() {
        let cli = Cli::try_parse_from(["voxgate"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.listen.device.is_none());
    }

    #[test]
    fn test_top_level_listen_overrides() {
        let cli = Cli::try_parse_from([
            "voxgate",
            "--device",
            "pulse",
            "--wake-phrase",
            "computer",
            "--threshold",
            "80",
            "--no-beep",
        ])
        .unwrap();
        assert_eq!(cli.listen.device.as_deref(), Some("pulse"));
        assert_eq!(cli.listen.wake_phrase.as_deref(), Some("computer"));
        assert_eq!(cli.listen.threshold, Some(80));
        assert!(cli.listen.no_beep);
    }

    #[test]
    fn test_listen_subcommand_with_duration() {
        let cli = Cli::try_parse_from(["voxgate", "listen", "--for", "1m 30s"]).unwrap();
        match cli.command {
            Some(Commands::Listen { args }) => {
                assert_eq!(args.run_for, Some(Duration::from_secs(90)));
            }
            other => panic!("expected listen, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["voxgate", "--threshold", "101"]).is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(Cli::try_parse_from(["voxgate", "listen", "--for", "0s"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["voxgate", "replay", "clip.wav", "-vv", "-q"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        match cli.command {
            Some(Commands::Replay { file, dry_run, .. }) => {
                assert_eq!(file, PathBuf::from("clip.wav"));
                assert!(!dry_run);
            }
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_joins_words() {
        let cli = Cli::try_parse_from(["voxgate", "resolve", "open", "youtube"]).unwrap();
        match cli.command {
            Some(Commands::Resolve { text, .. }) => {
                assert_eq!(text.join(" "), "open youtube");
            }
            other => panic!("expected resolve, got {:?}", other),
        }
    }

    #[test]
    fn test_config_actions() {
        let cli = Cli::try_parse_from(["voxgate", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
