//! Pipeline wiring.

use crate::cache::{ImageCache, ImageCaching};
use crate::decoder::{DefaultImageDecoder, ImageDecoding};
use crate::loader::{DataLoadError, DataLoading, DefaultDataLoader};
use crate::pipeline::scheduler::DEFAULT_MAX_CONCURRENT_LOADS;
use std::fmt;
use std::sync::Arc;

/// Collaborators and limits for an [`ImagePipeline`](super::ImagePipeline).
#[derive(Clone)]
pub struct PipelineConfig {
    /// Fetches raw bytes
    pub data_loader: Arc<dyn DataLoading>,
    /// Memory cache for decoded images; `None` disables caching
    pub image_cache: Option<Arc<dyn ImageCaching>>,
    /// Turns bytes into images
    pub decoder: Arc<dyn ImageDecoding>,
    /// Units of work allowed to run at once
    pub max_concurrent_loads: usize,
}

impl PipelineConfig {
    /// Creates a config around `data_loader` with a default memory cache and decoder.
    pub fn new(data_loader: Arc<dyn DataLoading>) -> Self {
        Self {
            data_loader,
            image_cache: Some(Arc::new(ImageCache::default())),
            decoder: Arc::new(DefaultImageDecoder),
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
        }
    }

    /// Default config loading from files and HTTP.
    pub fn try_default() -> Result<Self, DataLoadError> {
        Ok(Self::new(Arc::new(DefaultDataLoader::try_default()?)))
    }

    pub fn with_image_cache(mut self, cache: Arc<dyn ImageCaching>) -> Self {
        self.image_cache = Some(cache);
        self
    }

    pub fn without_image_cache(mut self) -> Self {
        self.image_cache = None;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoding>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max;
        self
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("image_cache", &self.image_cache.is_some())
            .field("max_concurrent_loads", &self.max_concurrent_loads)
            .finish_non_exhaustive()
    }
}
