//! Application entry points.
//!
//! Builds the listener from configuration and runs it against the
//! microphone or a WAV file:
//! capture → segment → recognize → resolve → dispatch

use crate::audio::beep::{Acknowledger, SilentAcknowledger};
use crate::audio::wav::WavSampleSource;
use crate::cli::ListenArgs;
use crate::commands::{
    ActionDispatcher, CommandExecutor, CommandResolver, SystemCommandExecutor,
};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{ConsoleSink, Listener, OverflowPolicy, StatsSnapshot};
use crate::stt::recognizer::resolve_model_path;
use crate::stt::{Recognizer, WhisperConfig, WhisperRecognizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber on stderr.
///
/// `RUST_LOG` wins over the verbosity flags when set.
pub fn init_logging(quiet: bool, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(quiet, verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_filter(quiet: bool, verbosity: u8) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Load the configuration file with environment overrides.
///
/// Returns the path it was loaded from; relative phrase table paths are
/// resolved against that file's directory.
pub fn load_config(custom_path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let (config, path) = match custom_path {
        Some(path) => (Config::load(path)?, path.to_path_buf()),
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path)?, path)
        }
    };
    Ok((config.with_env_overrides(), path))
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &ListenArgs) -> Result<()> {
    if let Some(device) = &args.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(model) = &args.model {
        config.stt.model = model.clone();
    }
    if let Some(phrase) = &args.wake_phrase {
        config.wake.phrase = phrase.clone();
    }
    if let Some(threshold) = args.threshold {
        config.resolver.threshold = threshold;
    }
    if let Some(phrases) = &args.phrases {
        config.resolver.phrases = Some(std::path::absolute(phrases)?);
    }
    if args.no_beep {
        config.wake.beep = false;
    }
    Ok(())
}

/// Load the phrase table and build the resolver.
pub fn build_resolver(config: &Config, config_path: &Path) -> Result<CommandResolver> {
    let table = config.load_phrase_table(config_path)?;
    tracing::debug!(
        threshold = config.resolver.threshold,
        scorer = ?config.resolver.scorer,
        "building resolver"
    );
    Ok(CommandResolver::new(
        &table,
        config.resolver.threshold,
        config.resolver.scorer,
    ))
}

/// Load the Whisper model named by the configuration.
pub fn build_recognizer(config: &Config) -> Result<Arc<dyn Recognizer>> {
    let whisper_config = WhisperConfig {
        model_path: resolve_model_path(&config.stt.model),
        language: config.stt.language.clone(),
        threads: config.stt.threads.map(|t| t as usize),
    };
    let recognizer = WhisperRecognizer::new(whisper_config)?;
    Ok(Arc::new(recognizer))
}

fn build_dispatcher(config: &Config, executor: Arc<dyn CommandExecutor>) -> ActionDispatcher {
    ActionDispatcher::new(config.actions(), executor)
}

#[cfg(feature = "cpal-audio")]
fn acknowledger(config: &Config) -> Arc<dyn Acknowledger> {
    if config.wake.beep {
        Arc::new(crate::audio::beep::ToneAcknowledger::default())
    } else {
        Arc::new(SilentAcknowledger)
    }
}

#[cfg(not(feature = "cpal-audio"))]
fn acknowledger(_config: &Config) -> Arc<dyn Acknowledger> {
    Arc::new(SilentAcknowledger)
}

fn print_stats(stats: &StatsSnapshot, verbosity: u8) {
    if verbosity > 0 {
        eprintln!("{}", stats);
    }
}

/// Listen on the microphone until Ctrl-C (or `run_for` elapses).
///
/// Configuration, model and device errors are returned before anything is
/// captured; once listening, processing errors are only logged.
#[cfg(feature = "cpal-audio")]
pub async fn run_listen_command(
    mut config: Config,
    config_path: &Path,
    args: &ListenArgs,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    use crate::audio::capture::{CpalSampleSource, suppress_audio_warnings};

    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    apply_overrides(&mut config, args)?;
    config.validate()?;

    let resolver = build_resolver(&config, config_path)?;
    let recognizer = build_recognizer(&config)?;
    let dispatcher = build_dispatcher(&config, Arc::new(SystemCommandExecutor));
    let source = CpalSampleSource::new(config.audio.device.as_deref())?
        .with_sample_rate(config.audio.sample_rate);

    let handle = Listener::new(config.listener_config(OverflowPolicy::DropOldest))
        .with_acknowledger(acknowledger(&config))
        .start(
            Box::new(source),
            recognizer,
            resolver,
            dispatcher,
            Box::new(ConsoleSink::new(quiet)),
        )?;

    wait_for_shutdown(args.run_for).await?;

    let stats = handle.stop();
    print_stats(&stats, verbosity);
    Ok(())
}

/// Without capture support there is no microphone to listen on.
#[cfg(not(feature = "cpal-audio"))]
pub async fn run_listen_command(
    _config: Config,
    _config_path: &Path,
    _args: &ListenArgs,
    _quiet: bool,
    _verbosity: u8,
) -> Result<()> {
    Err(crate::error::VoxgateError::AudioCapture {
        message: "this build has no audio capture; rebuild with the cpal-audio feature".to_string(),
    })
}

#[cfg(feature = "cpal-audio")]
async fn wait_for_shutdown(run_for: Option<std::time::Duration>) -> Result<()> {
    match run_for {
        Some(duration) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = tokio::time::sleep(duration) => {
                    tracing::info!(?duration, "listening period elapsed");
                }
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    crate::output::clear_line();
    Ok(())
}

/// Executor that reports what it would launch instead of launching it.
struct DryRunExecutor;

impl CommandExecutor for DryRunExecutor {
    fn launch(&self, program: &str, args: &[String]) -> Result<()> {
        eprintln!("(dry run) {} {}", program, args.join(" "));
        Ok(())
    }
}

/// Replay a WAV file through the listener and wait until it is drained.
#[allow(clippy::too_many_arguments)]
pub fn run_replay_command(
    mut config: Config,
    config_path: &Path,
    file: &Path,
    phrases: Option<PathBuf>,
    model: Option<String>,
    dry_run: bool,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    apply_overrides(
        &mut config,
        &ListenArgs {
            model,
            phrases,
            ..ListenArgs::default()
        },
    )?;
    config.validate()?;

    let source = WavSampleSource::open(file)?;
    tracing::info!(file = %file.display(), duration_ms = source.duration_ms(), "replaying");

    let resolver = build_resolver(&config, config_path)?;
    let recognizer = build_recognizer(&config)?;
    let executor: Arc<dyn CommandExecutor> = if dry_run {
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(SystemCommandExecutor)
    };
    let dispatcher = build_dispatcher(&config, executor);

    // Every chunk of a file is processed; there is no real-time deadline to protect.
    let handle = Listener::new(config.listener_config(OverflowPolicy::Block)).start(
        Box::new(source),
        recognizer,
        resolver,
        dispatcher,
        Box::new(ConsoleSink::new(quiet)),
    )?;
    let stats = handle.wait();
    print_stats(&stats, verbosity);
    Ok(())
}

/// Resolve `text` against the configured phrase table and print the result.
pub fn run_resolve_command(
    mut config: Config,
    config_path: &Path,
    text: &str,
    phrases: Option<PathBuf>,
) -> Result<()> {
    apply_overrides(
        &mut config,
        &ListenArgs {
            phrases,
            ..ListenArgs::default()
        },
    )?;
    config.validate()?;

    let resolver = build_resolver(&config, config_path)?;
    println!("{}", describe_resolution(&resolver, text));
    Ok(())
}

/// One line describing how `text` resolves.
pub fn describe_resolution(resolver: &CommandResolver, text: &str) -> String {
    match resolver.resolve(text) {
        Some(resolution) => format!(
            "{} ({}%, matched \"{}\")",
            resolution.command,
            resolution.rounded_score(),
            resolution.phrase
        ),
        None => match resolver.best_match(text) {
            Some(best) => format!(
                "not recognized (closest: {} at {}%, threshold {}%)",
                best.command,
                best.rounded_score(),
                resolver.threshold()
            ),
            None => "not recognized".to_string(),
        },
    }
}
