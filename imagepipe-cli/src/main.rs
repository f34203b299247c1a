//! imagepipe CLI - Command-line interface
//!
//! This binary drives the imagepipe library: loading images and raw data
//! through the pipeline, inspecting cache directories and managing the
//! configuration file.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use imagepipe::logging::{init_logging, LoggingGuard};
use std::path::{Path, PathBuf};
use tracing::info;

use commands::config::ConfigCommands;
use commands::data::DataArgs;
use commands::fetch::FetchArgs;
use commands::inspect::InspectArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "imagepipe")]
#[command(version = imagepipe::VERSION)]
#[command(about = "Load images with request coalescing, priorities and caching", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.imagepipe/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the log file (overrides config)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Mirror log output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and decode images
    Fetch(FetchArgs),

    /// Fetch raw bytes and report progress
    Data(DataArgs),

    /// List files in a disk cache directory
    Inspect(InspectArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    let logging = || -> Result<LoggingGuard, CliError> {
        let guard = start_logging(config_path, cli.log_dir.as_deref(), cli.verbose)?;
        info!(version = imagepipe::VERSION, log = %guard.path().display(), "imagepipe starting");
        Ok(guard)
    };

    match cli.command {
        // No logging here: config commands must work even when the file is broken
        Commands::Config { command } => commands::config::run(command, config_path),
        Commands::Fetch(args) => {
            let _logging = logging()?;
            commands::fetch::run(args, config_path).await
        }
        Commands::Data(args) => {
            let _logging = logging()?;
            commands::data::run(args, config_path).await
        }
        Commands::Inspect(args) => {
            let _logging = logging()?;
            commands::inspect::run(args, config_path)
        }
    }
}

fn start_logging(
    config_path: Option<&Path>,
    log_dir: Option<&Path>,
    verbose: bool,
) -> Result<LoggingGuard, CliError> {
    let config = commands::common::load_config(config_path)?;
    let dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.logging.directory.clone());
    init_logging(&dir, &config.logging.file, verbose)
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}
