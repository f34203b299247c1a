//! `imagepipe data` - fetch raw bytes with progress.

use clap::Args;
use imagepipe::debug::ByteCountFormatter;
use imagepipe::TaskEvent;
use std::path::Path;

use super::common::{build_pipeline, load_config};
use crate::error::CliError;

/// Arguments for `imagepipe data`.
#[derive(Debug, Args)]
pub struct DataArgs {
    /// File path or http(s) URL to fetch
    pub locator: String,
}

/// Run the data command.
pub async fn run(args: DataArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config, None)?;
    let formatter = ByteCountFormatter::new();

    let mut task = pipeline.load_data(args.locator.as_str());
    while let Some(event) = task.next_event().await {
        match event {
            TaskEvent::Progress(progress) if progress.total > 0 => {
                println!(
                    "  {} / {} ({:.0}%)",
                    formatter.format(progress.completed),
                    formatter.format(progress.total),
                    progress.fraction() * 100.0
                );
            }
            TaskEvent::Progress(progress) => {
                println!("  {}", formatter.format(progress.completed));
            }
            TaskEvent::Completed(Ok(response)) => {
                println!(
                    "{}: {} bytes ({})",
                    args.locator,
                    response.data.len(),
                    formatter.format(response.data.len() as u64)
                );
                return Ok(());
            }
            TaskEvent::Completed(Err(error)) => {
                return Err(CliError::Load {
                    locator: args.locator,
                    error,
                });
            }
        }
    }
    Ok(())
}
