use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use autokey::app::{self, Controller, RunOptions};
use autokey::config::{Config, Mode, DEFAULT_CONFIG_FILE};
use autokey::input::default_backend;
use autokey::keys::{format_key_text, resolve_key, ResolvePolicy};

/// Keyboard sequence and mouse click playback bound to global hotkeys
#[derive(Debug, Parser)]
#[command(name = autokey::PKG_NAME, version = autokey::PKG_VERSION)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register the hotkeys and wait for them (default)
    Run(RunArgs),
    /// Write a sample configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the configuration
    Check,
    /// Show how key names resolve
    Resolve {
        /// Key names such as "a", "f5" or "ctrl+shift+s"
        #[arg(required = true)]
        keys: Vec<String>,
        /// Treat unknown key parts as errors
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Debug, Args, Default)]
struct RunArgs {
    /// Log input instead of injecting it
    #[arg(long)]
    dry_run: bool,

    /// Start playback immediately
    #[arg(long)]
    autostart: bool,

    /// Exit after the first run finishes
    #[arg(long)]
    exit_on_finish: bool,

    /// Bind the window of this process as the background target
    #[arg(short, long)]
    process: Option<String>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(&cli.config, args).await,
        Command::Init { force } => init(&cli.config, force),
        Command::Check => check(&cli.config),
        Command::Resolve { keys, strict } => {
            resolve(&keys, ResolvePolicy::from_strict(strict));
            Ok(())
        }
    }
}

async fn run(path: &Path, args: RunArgs) -> Result<()> {
    let (config, created) = Config::load_or_init(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if created {
        println!("Created sample config at {}", path.display().to_string().cyan());
    }
    if let Err(e) = config.validate() {
        warn!(error = %e, "Config has problems");
        println!("{} {e}", "warning:".yellow().bold());
    }

    let backend = default_backend(args.dry_run)?;
    info!(
        version = autokey::PKG_VERSION,
        config = %path.display(),
        dry_run = args.dry_run,
        "Starting"
    );

    let process = args.process.or_else(|| config.target_process.clone());
    let (mut controller, events) = Controller::new(config, backend);
    if let Some(name) = process {
        controller.bind_process(&name);
    }

    let options = RunOptions {
        autostart: args.autostart,
        exit_on_finish: args.exit_on_finish,
    };
    app::run(controller, events, options).await
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::sample().save_to_file(path)?;
    println!("Wrote {}", path.display().to_string().cyan());
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let config = Config::from_file(path)?;
    config.validate()?;

    println!("{} {}", "OK".green().bold(), path.display());
    println!(
        "  hotkeys: start [{}] / stop [{}] / bind [{}]",
        format_key_text(&config.hotkeys.start),
        format_key_text(&config.hotkeys.stop),
        format_key_text(&config.hotkeys.bind)
    );
    match config.mode {
        Mode::Keyboard => {
            let passes = match config.loop_count {
                0 => "until stopped".to_string(),
                n => format!("{n} pass(es)"),
            };
            println!("  keyboard: {} action(s), {passes}", config.actions.len());
            for action in &config.actions {
                println!("    {:<16} {} ms", format_key_text(&action.key), action.delay);
            }
        }
        Mode::Mouse => println!(
            "  mouse: {:?} {:?} click, {} per second",
            config.mouse_button, config.mouse_click, config.mouse_cps
        ),
    }
    Ok(())
}

fn resolve(keys: &[String], policy: ResolvePolicy) {
    for key in keys {
        match resolve_key(key, policy) {
            Ok(codes) => {
                let codes: Vec<String> = codes.iter().map(|c| format!("{c:#04x}")).collect();
                println!("{:<20} {}", format_key_text(key), codes.join(" "));
            }
            Err(e) => println!("{:<20} {}", format_key_text(key), e.to_string().red()),
        }
    }
}
