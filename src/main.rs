use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use voxgate::app::{
    init_logging, load_config, run_listen_command, run_replay_command, run_resolve_command,
};
use voxgate::cli::{Cli, Commands, ConfigAction};
use voxgate::config::Config;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    tracing::debug!(version = %voxgate::version_string(), "starting");

    match cli.command {
        None => {
            let (config, path) = load_config(cli.config.as_deref())?;
            run_listen_command(config, &path, &cli.listen, cli.quiet, cli.verbose).await?;
        }
        Some(Commands::Listen { args }) => {
            let (config, path) = load_config(cli.config.as_deref())?;
            run_listen_command(config, &path, &args, cli.quiet, cli.verbose).await?;
        }
        Some(Commands::Replay {
            file,
            phrases,
            model,
            dry_run,
        }) => {
            let (config, path) = load_config(cli.config.as_deref())?;
            run_replay_command(
                config,
                &path,
                &file,
                phrases,
                model,
                dry_run,
                cli.quiet,
                cli.verbose,
            )?;
        }
        Some(Commands::Resolve { text, phrases }) => {
            let (config, path) = load_config(cli.config.as_deref())?;
            run_resolve_command(config, &path, &text.join(" "), phrases)?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                let (config, _) = load_config(cli.config.as_deref())?;
                config.validate()?;
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Path => {
                let path = cli.config.unwrap_or_else(Config::default_path);
                let status = if path.exists() {
                    "exists".green().to_string()
                } else {
                    "not created, using defaults".dimmed().to_string()
                };
                println!("{} ({})", path.display(), status);
            }
        },
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxgate",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = voxgate::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("this build has no audio capture; rebuild with the cpal-audio feature")
}
