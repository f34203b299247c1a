//! imagepipe - request orchestration for image loading
//!
//! This library sits between callers asking for images and the components
//! that fetch, decode and transform them. It collapses duplicate requests
//! into one unit of work, schedules work by priority with bounded
//! concurrency, serves repeated requests from a memory cache, and reports
//! progress to every interested caller.
//!
//! # High-Level API
//!
//! ```no_run
//! use imagepipe::{ImagePipeline, ImageRequest, PipelineConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = ImagePipeline::new(PipelineConfig::try_default()?);
//! let response = pipeline.image("https://example.com/a.png").await?;
//! assert!(response.cache_type.is_none());
//!
//! // The second request is served from memory.
//! let response = pipeline.image("https://example.com/a.png").await?;
//! assert!(response.cache_type.is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod container;
pub mod debug;
pub mod decoder;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod priority;
pub mod processor;
pub mod request;

pub use container::{CacheType, DataResponse, ImageContainer, ImageResponse};
pub use pipeline::{
    DataTask, ImagePipeline, ImageTask, PipelineConfig, PipelineError, PipelineStats,
    PipelineTask, TaskEvent, TaskProgress,
};
pub use priority::Priority;
pub use request::ImageRequest;

/// Version of the imagepipe library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
