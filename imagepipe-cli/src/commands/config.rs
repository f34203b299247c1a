//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use clap::Subcommand;
use imagepipe::config::{format_size, ConfigFile};
use std::path::Path;

use super::common::{load_config, resolve_config_path};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration (file values over defaults)
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Init { force } => run_init(config_path, force),
    }
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = resolve_config_path(config_path);
    println!("{}", path.display());
    if !path.exists() {
        println!("(file does not exist, defaults in use)");
    }
    Ok(())
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    println!("[pipeline]");
    println!("max_concurrent_loads = {}", config.pipeline.max_concurrent_loads);
    println!("chunk_size = {}", format_size(config.pipeline.chunk_size));
    println!();
    println!("[cache]");
    println!("memory_limit = {}", format_size(config.cache.memory_limit));
    match config.cache.count_limit {
        Some(limit) => println!("count_limit = {}", limit),
        None => println!("count_limit = unlimited"),
    }
    println!("entry_cost_limit = {}%", config.cache.entry_cost_percent);
    println!("directory = {}", config.cache.directory.display());
    println!();
    println!("[http]");
    println!("timeout = {}", config.http.timeout_secs);
    println!("user_agent = {}", config.http.user_agent);
    println!();
    println!("[logging]");
    println!("directory = {}", config.logging.directory.display());
    println!("file = {}", config.logging.file);
    println!();
    println!("[debug]");
    let classifier = config.kind_classifier();
    let kinds: Vec<String> = classifier
        .rules()
        .iter()
        .map(|(needle, kind)| format!("{}:{}", needle, kind))
        .collect();
    println!("kinds = {}", kinds.join(", "));

    Ok(())
}

fn run_init(config_path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = resolve_config_path(config_path);
    if force {
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
    } else if ConfigFile::ensure_exists_at(&path)? {
        println!("Created {}", path.display());
    } else {
        println!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_show() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        run(ConfigCommands::Init { force: false }, Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());

        run(ConfigCommands::Show, Some(&path)).unwrap();
    }

    #[test]
    fn test_init_does_not_overwrite_without_force() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[http]\ntimeout = 7\n").unwrap();

        run(ConfigCommands::Init { force: false }, Some(&path)).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap().http.timeout_secs, 7);

        run(ConfigCommands::Init { force: true }, Some(&path)).unwrap();
        assert_eq!(
            ConfigFile::load_from(&path).unwrap().http.timeout_secs,
            ConfigFile::default().http.timeout_secs
        );
    }

    #[test]
    fn test_show_reports_invalid_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[cache]\nmemory_limit = lots\n").unwrap();

        let err = run(ConfigCommands::Show, Some(&path)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("memory_limit"));
    }
}
