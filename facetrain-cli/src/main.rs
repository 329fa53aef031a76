//! facetrain CLI — inspect callback configuration and dry-run the
//! verification, logging, and checkpoint callbacks.

mod commands;
mod simulate;

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Training-loop instrumentation for face recognition
#[derive(Parser, Debug)]
#[command(name = "facetrain", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (searched for `.facetrain/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List configured verification benchmarks and whether their files exist
    Targets,
    /// Drive all callbacks over a synthetic training run
    Simulate(simulate::SimulateArgs),
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective layered configuration as TOML
    Show,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = facetrain_core::load_config(Some(&cli.workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let log_dir = matches!(cli.command, Commands::Simulate(_)).then(|| config.checkpoint.output.clone());
    let _guard = init_tracing(cli.verbose, cli.quiet, log_dir.as_deref())?;

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => commands::show_config(&config),
        Commands::Targets => commands::list_targets(&config),
        Commands::Simulate(args) => simulate::run(config, &args),
    }
}

/// Human-readable stderr output, plus a JSON `training.log` in `log_dir`
/// when one is given.
fn init_tracing(verbose: u8, quiet: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, "training.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
