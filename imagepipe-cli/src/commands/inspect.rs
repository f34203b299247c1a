//! `imagepipe inspect` - list the contents of a disk cache directory.

use clap::Args;
use imagepipe::debug::{ByteCountFormatter, DataCacheDebugInfo};
use std::path::{Path, PathBuf};

use super::common::load_config;
use crate::error::CliError;

/// Arguments for `imagepipe inspect`.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Directory to inspect (defaults to cache.directory from config)
    pub dir: Option<PathBuf>,
}

/// Run the inspect command.
pub fn run(args: InspectArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let dir = args.dir.unwrap_or_else(|| config.cache.directory.clone());
    let classifier = config.kind_classifier();
    let formatter = ByteCountFormatter::new();

    let entries = DataCacheDebugInfo::scan(&dir).map_err(|error| CliError::Inspect {
        path: dir.clone(),
        error,
    })?;

    println!("Disk cache: {}", dir.display());
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    for entry in &entries {
        let name = entry
            .path
            .strip_prefix(&dir)
            .unwrap_or(&entry.path)
            .display()
            .to_string();
        let dimensions = entry
            .image()
            .map(|image| format!("{}x{}", image.width(), image.height()))
            .unwrap_or_else(|| "-".to_string());
        let kind = classifier.classify(&name).unwrap_or("-");
        println!(
            "  {:<48} {:>10} {:>11} {}",
            name,
            entry.data_size(&formatter),
            dimensions,
            kind
        );
    }
    println!("  {} files", entries.len());
    Ok(())
}
