//! Common types and utilities shared across CLI commands.

use image::imageops::FilterType;
use imagepipe::config::{config_file_path, ConfigFile};
use imagepipe::processor::{AnonymousProcessor, ImageProcessing, ProcessError};
use imagepipe::{ImageContainer, ImagePipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CliError;

/// Resolve the config file path from the `--config` flag or the default.
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    cli_path.map(Path::to_path_buf).unwrap_or_else(config_file_path)
}

/// Load configuration, falling back to defaults when the file is missing.
pub fn load_config(cli_path: Option<&Path>) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(&resolve_config_path(cli_path))?)
}

/// Build a pipeline from configuration, optionally overriding concurrency.
pub fn build_pipeline(
    config: &ConfigFile,
    concurrency: Option<usize>,
) -> Result<ImagePipeline, CliError> {
    let mut pipeline_config = config.pipeline_config()?;
    if let Some(concurrency) = concurrency {
        pipeline_config = pipeline_config.with_max_concurrent_loads(concurrency);
    }
    Ok(ImagePipeline::new(pipeline_config))
}

/// Parse a processor spec such as `grayscale`, `blur:2.5`, `resize:64x64`
/// or `thumbnail:128`.
pub fn parse_processor(spec: &str) -> Result<Arc<dyn ImageProcessing>, CliError> {
    let invalid = |reason: &str| CliError::Config(format!("processor '{}': {}", spec, reason));
    let (name, argument) = match spec.split_once(':') {
        Some((name, argument)) => (name.trim(), Some(argument.trim())),
        None => (spec.trim(), None),
    };

    let processor: Arc<dyn ImageProcessing> = match (name, argument) {
        ("grayscale", None) => Arc::new(AnonymousProcessor::new(spec, |c: ImageContainer| {
            Ok(ImageContainer::new(c.image().grayscale()))
        })),
        ("blur", Some(sigma)) => {
            let sigma: f32 = sigma
                .parse()
                .ok()
                .filter(|s: &f32| *s > 0.0)
                .ok_or_else(|| invalid("expected a positive blur radius"))?;
            Arc::new(AnonymousProcessor::new(spec, move |c: ImageContainer| {
                Ok(ImageContainer::new(c.image().blur(sigma)))
            }))
        }
        ("resize", Some(size)) => {
            let (width, height) = parse_dimensions(size)
                .ok_or_else(|| invalid("expected dimensions like 64x64"))?;
            Arc::new(AnonymousProcessor::new(spec, move |c: ImageContainer| {
                Ok(ImageContainer::new(c.image().resize_exact(
                    width,
                    height,
                    FilterType::Triangle,
                )))
            }))
        }
        ("thumbnail", Some(size)) => {
            let size: u32 = size
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| invalid("expected a positive edge length"))?;
            Arc::new(AnonymousProcessor::new(spec, move |c: ImageContainer| {
                if c.width() == 0 || c.height() == 0 {
                    return Err(ProcessError::new("image has no pixels"));
                }
                Ok(ImageContainer::new(c.image().thumbnail(size, size)))
            }))
        }
        _ => {
            return Err(invalid(
                "expected one of grayscale, blur:<sigma>, resize:<w>x<h>, thumbnail:<size>",
            ))
        }
    };
    Ok(processor)
}

fn parse_dimensions(size: &str) -> Option<(u32, u32)> {
    let (width, height) = size.split_once(['x', 'X'])?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
