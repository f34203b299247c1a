//! `imagepipe fetch` - load and decode images through the pipeline.
//!
//! Every locator can be requested several times at once to show request
//! coalescing: repeated requests share one download and decode.

use clap::Args;
use futures::future::join_all;
use imagepipe::debug::ByteCountFormatter;
use imagepipe::{ImageRequest, Priority};
use std::path::Path;
use tracing::info;

use super::common::{build_pipeline, load_config, parse_processor};
use crate::error::CliError;

/// Arguments for `imagepipe fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// File paths or http(s) URLs to load
    #[arg(required = true)]
    pub locators: Vec<String>,

    /// Processor to apply, in order (grayscale, blur:<sigma>, resize:<w>x<h>, thumbnail:<size>)
    #[arg(long = "processor", short = 'p')]
    pub processors: Vec<String>,

    /// Request priority (very-low, low, normal, high, very-high)
    #[arg(long, default_value_t = Priority::Normal)]
    pub priority: Priority,

    /// Number of identical concurrent requests per locator
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,

    /// Maximum loads running at once (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: Option<u32>,
}

/// Run the fetch command.
pub async fn run(args: FetchArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config, args.concurrency.map(|c| c as usize))?;

    let processors = args
        .processors
        .iter()
        .map(|spec| parse_processor(spec))
        .collect::<Result<Vec<_>, _>>()?;

    // Hold the queue until the whole batch is attached
    pipeline.scheduler().set_suspended(true);
    let mut tasks = Vec::new();
    for locator in &args.locators {
        let request = ImageRequest::new(locator.as_str())
            .with_processors(processors.clone())
            .with_priority(args.priority);
        for _ in 0..args.repeat {
            tasks.push((locator.clone(), pipeline.load_image(request.clone())));
        }
    }
    let total = tasks.len();
    info!(requests = total, priority = %args.priority, "Fetching images");
    pipeline.scheduler().set_suspended(false);

    let results = join_all(
        tasks
            .into_iter()
            .map(|(locator, task)| async move { (locator, task.response().await) }),
    )
    .await;

    let formatter = ByteCountFormatter::new();
    let mut failed = Vec::new();
    for (locator, result) in results {
        match result {
            Ok(response) => {
                let source = if response.cache_type.is_some() {
                    " (memory cache)"
                } else {
                    ""
                };
                println!(
                    "{}: {}x{}, {}{}",
                    locator,
                    response.container.width(),
                    response.container.height(),
                    formatter.format(response.container.cost() as u64),
                    source
                );
            }
            Err(error) => {
                println!("{}: failed - {}", locator, error);
                failed.push((locator, error));
            }
        }
    }

    let stats = pipeline.stats();
    println!();
    println!("Requests:  {}", stats.images.total_requests);
    println!("  New:       {}", stats.images.new_requests);
    println!(
        "  Coalesced: {} ({:.1}%)",
        stats.images.coalesced_requests,
        stats.images.coalescing_ratio() * 100.0
    );
    println!(
        "Cache:     {} images, {}",
        stats.cache_count,
        formatter.format(stats.cache_cost as u64)
    );
    pipeline.log_stats();

    match failed.len() {
        0 => Ok(()),
        1 if total == 1 => {
            let (locator, error) = failed.remove(0);
            Err(CliError::Load { locator, error })
        }
        count => Err(CliError::Incomplete {
            failed: count,
            total,
        }),
    }
}
