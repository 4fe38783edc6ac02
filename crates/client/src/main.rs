//! termhop
//!
//! Interactive SSH shells on hosts picked from an inventory.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use client::config::{default_config_path, Config};
use client::connector;
use client::session::{
    spawn_resize_events, ControllerOptions, LocalStreams, SessionReport, TerminalController,
};
use client::terminal::{TerminalBackend, Tty};
use inventory::{FallbackPolicy, Inventory, Target};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// termhop - open an interactive shell on an inventory host.
#[derive(Parser, Debug)]
#[command(name = "termhop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Alias or address of the target (aliases are matched first)
    pub selector: Option<String>,

    /// Connect to the target with this alias
    #[arg(short, long, conflicts_with_all = ["selector", "ip"])]
    pub alias: Option<String>,

    /// Connect to the target with this address
    #[arg(long, conflicts_with = "selector")]
    pub ip: Option<String>,

    /// Path to the inventory file
    #[arg(short, long, value_name = "FILE")]
    pub inventory: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the numbered inventory and exit
    #[arg(short, long)]
    pub list: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long, conflicts_with_all = ["selector", "alias", "ip", "list"])]
    pub init_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    // Exiting here abandons the blocking stdin read and the resize listener.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides, then command-line ones
    let env_overrides = config.apply_env_overrides();
    if let Some(path) = &cli.inventory {
        config.inventory.path = path.clone();
    }

    config.validate()?;

    let _log_guard = init_logging(&config, cli.verbose)?;
    for (variable, value) in &env_overrides {
        tracing::info!(variable, value = %value, "Applied environment override");
    }
    tracing::debug!(inventory = %config.inventory.path.display(), "termhop starting");

    if cli.init_config {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        write_initial_config(&config, &path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(0);
    }

    let inventory = Inventory::load(&config.inventory.path)?;

    if cli.list {
        inventory.write_numbered(&mut io::stdout().lock())?;
        return Ok(0);
    }

    let target = select_target(&cli, &inventory, config.inventory.fallback)?;

    println!("Connecting to {}...", target);
    let mut session = connector::connect(target, &config.connection).await?;

    let resizes = spawn_resize_events(|| Tty.size()).context("Failed to watch for window changes")?;
    let controller = TerminalController::new(Tty, ControllerOptions::from(&config.terminal));
    let report = controller
        .run(&mut session, LocalStreams::stdio(), resizes)
        .await;

    print_outcome(&report, &mut io::stdout().lock(), &mut io::stderr().lock())?;
    Ok(report.exit_code())
}

/// Prints the closing message, then the cause of a failed session.
fn print_outcome(
    report: &SessionReport,
    out: &mut impl Write,
    err: &mut impl Write,
) -> io::Result<()> {
    if let Some(message) = &report.message {
        writeln!(out, "{}", message)?;
    }
    if let Err(e) = &report.outcome {
        writeln!(err, "Error: {}", e)?;
    }
    Ok(())
}

/// Saves `config` to `path` unless a file is already there.
fn write_initial_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    config.save(path)
}

/// Installs the tracing subscriber.
///
/// Logs go to stderr, or to `logging.file` through a non-blocking writer.
/// The returned guard flushes that writer when dropped.
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    let filter = EnvFilter::new(level);

    match &config.logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// Picks the target from the command line, or interactively.
///
/// An alias, address or selector that matches nothing falls through to the
/// interactive pick-list.
fn select_target<'a>(
    cli: &Cli,
    inventory: &'a Inventory,
    fallback: FallbackPolicy,
) -> anyhow::Result<&'a Target> {
    let matched = if let Some(alias) = &cli.alias {
        inventory.resolve_by_alias(alias)
    } else if let Some(ip) = &cli.ip {
        inventory.resolve_by_address(ip)
    } else if let Some(selector) = &cli.selector {
        inventory.resolve(selector).ok()
    } else {
        None
    };

    if let Some(target) = matched {
        return Ok(target);
    }

    let requested = cli
        .alias
        .as_deref()
        .or(cli.ip.as_deref())
        .or(cli.selector.as_deref());
    if let Some(requested) = requested {
        tracing::info!(requested, "No server matched, falling back to interactive selection");
    }

    let mut reader = io::stdin().lock();
    let mut writer = io::stdout().lock();
    Ok(inventory.select_interactive(&mut reader, &mut writer, fallback)?)
}
