//! Request orchestration.
//!
//! [`ImagePipeline`] is the entry point. It derives a cache key for every
//! request, serves hits straight from the memory cache and otherwise
//! attaches the request to a coalesced unit of work:
//!
//! ```text
//! load_image ─► ImageCacheKey ─► memory cache ── hit ──► completed task
//!                                     │
//!                                    miss
//!                                     ▼
//!                              TaskRegistry ── active? ──► attach observer
//!                                     │
//!                                    new
//!                                     ▼
//!                              WorkScheduler ─► fetch ─► decode ─► process
//!                                                                     │
//!                           cache.set + fan-out to every observer ◄───┘
//! ```
//!
//! # Key Components
//!
//! - [`PipelineTask`] - per-request handle for progress, priority and cancellation
//! - [`WorkScheduler`] - bounded, priority-ordered admission of work
//! - [`CoalescerStats`] - coalescing counters
//!
//! # Example
//!
//! ```no_run
//! use imagepipe::{ImagePipeline, ImageRequest, PipelineConfig, Priority};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = ImagePipeline::new(PipelineConfig::try_default()?);
//!
//! let task = pipeline.load_image(
//!     ImageRequest::new("https://example.com/photo.jpeg").with_priority(Priority::High),
//! );
//! let response = task.response().await?;
//! println!("{}x{}", response.container.width(), response.container.height());
//! # Ok(())
//! # }
//! ```

mod coalesce;
mod config;
mod error;
mod scheduler;
mod task;
mod work;

pub use coalesce::{CoalescerStats, WorkId};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use scheduler::{
    QueuedWork, SchedulerPermit, TicketId, WorkScheduler, DEFAULT_MAX_CONCURRENT_LOADS,
};
pub use task::{DataTask, ImageTask, PipelineTask, TaskEvent, TaskProgress};

use crate::cache::{ImageCacheKey, ImageCaching};
use crate::container::{DataResponse, ImageResponse};
use crate::priority::Priority;
use crate::request::ImageRequest;
use coalesce::TaskRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) struct PipelineShared {
    pub(crate) config: PipelineConfig,
    pub(crate) images: Arc<TaskRegistry<ImageCacheKey, ImageResponse>>,
    pub(crate) data: Arc<TaskRegistry<String, DataResponse>>,
    scheduler: WorkScheduler,
    invalidated: AtomicBool,
}

/// Point-in-time view of pipeline activity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub images: CoalescerStats,
    pub data: CoalescerStats,
    /// Units of work holding a scheduler slot
    pub running: usize,
    /// Units of work waiting for a slot
    pub queued: usize,
    /// Memory cache entries
    pub cache_count: usize,
    /// Memory cache cost in bytes
    pub cache_cost: usize,
}

/// Loads images with coalescing, prioritization and caching.
///
/// Cheap to clone; clones share caches, in-flight work and the scheduler.
#[derive(Clone)]
pub struct ImagePipeline {
    shared: Arc<PipelineShared>,
}

impl ImagePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let scheduler = WorkScheduler::new(config.max_concurrent_loads);
        info!(
            max_concurrent_loads = scheduler.max_concurrent(),
            image_cache = config.image_cache.is_some(),
            "Image pipeline created"
        );
        Self {
            shared: Arc::new(PipelineShared {
                images: Arc::new(TaskRegistry::new("image", scheduler.clone())),
                data: Arc::new(TaskRegistry::new("data", scheduler.clone())),
                config,
                scheduler,
                invalidated: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Starts loading an image and returns its task immediately.
    ///
    /// Equivalent requests in flight share one fetch and decode. Must be
    /// called from within a Tokio runtime.
    pub fn load_image(&self, request: impl Into<ImageRequest>) -> ImageTask {
        let request = request.into();
        if self.is_invalidated() {
            return task::completed(Err(PipelineError::PipelineInvalidated));
        }

        let key = ImageCacheKey::from_request(&request);
        let cache = self.shared.config.image_cache.as_ref();
        let (task, start) = self
            .shared
            .images
            .attach(key.clone(), request.priority(), || {
                let container = cache?.get(&key)?;
                Some(ImageResponse::from_cache(
                    container,
                    request.locator().map(str::to_string),
                ))
            });

        if let Some(start) = start {
            tokio::spawn(work::run_image(
                Arc::clone(&self.shared),
                request,
                key,
                start,
            ));
        }
        task
    }

    /// Loads an image and waits for the result.
    pub async fn image(
        &self,
        request: impl Into<ImageRequest>,
    ) -> Result<ImageResponse, PipelineError> {
        self.load_image(request).response().await
    }

    /// Starts fetching the raw bytes behind a request.
    ///
    /// Coalesced by resource identity, separately from image loads, and never
    /// cached. Processors on the request are ignored.
    pub fn load_data(&self, request: impl Into<ImageRequest>) -> DataTask {
        let request = request.into();
        if self.is_invalidated() {
            return task::completed(Err(PipelineError::PipelineInvalidated));
        }

        let key = request.image_id();
        let (task, start) = self
            .shared
            .data
            .attach(key.clone(), request.priority(), || None);

        if let Some(start) = start {
            tokio::spawn(work::run_data(
                Arc::clone(&self.shared),
                request,
                key,
                start,
            ));
        }
        task
    }

    /// Fetches raw bytes and waits for the result.
    pub async fn data(
        &self,
        request: impl Into<ImageRequest>,
    ) -> Result<DataResponse, PipelineError> {
        self.load_data(request).response().await
    }

    /// Returns the memory-cached image for a request without loading.
    pub fn cached_image(&self, request: &ImageRequest) -> Option<ImageResponse> {
        let cache = self.shared.config.image_cache.as_ref()?;
        let container = cache.get(&ImageCacheKey::from_request(request))?;
        Some(ImageResponse::from_cache(
            container,
            request.locator().map(str::to_string),
        ))
    }

    pub fn cache(&self) -> Option<&Arc<dyn ImageCaching>> {
        self.shared.config.image_cache.as_ref()
    }

    pub fn scheduler(&self) -> &WorkScheduler {
        &self.shared.scheduler
    }

    /// Effective priority of the in-flight image work for `request`.
    pub fn image_priority(&self, request: &ImageRequest) -> Option<Priority> {
        self.shared
            .images
            .active_priority(&ImageCacheKey::from_request(request))
    }

    /// Number of tasks attached to the in-flight image work for `request`.
    pub fn image_observers(&self, request: &ImageRequest) -> usize {
        self.shared
            .images
            .observer_count(&ImageCacheKey::from_request(request))
    }

    /// Cancels all outstanding work and rejects new requests.
    ///
    /// Outstanding tasks complete with [`PipelineError::PipelineInvalidated`].
    pub fn invalidate(&self) {
        if self.shared.invalidated.swap(true, Ordering::SeqCst) {
            return;
        }
        let images = self
            .shared
            .images
            .cancel_all(PipelineError::PipelineInvalidated);
        let data = self
            .shared
            .data
            .cancel_all(PipelineError::PipelineInvalidated);
        info!(images, data, "Image pipeline invalidated");
    }

    pub fn is_invalidated(&self) -> bool {
        self.shared.invalidated.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        let cache = self.shared.config.image_cache.as_ref();
        PipelineStats {
            images: self.shared.images.stats(),
            data: self.shared.data.stats(),
            running: self.shared.scheduler.running(),
            queued: self.shared.scheduler.queued().len(),
            cache_count: cache.map_or(0, |c| c.total_count()),
            cache_cost: cache.map_or(0, |c| c.total_cost()),
        }
    }

    /// Logs coalescing statistics for image and data work.
    pub fn log_stats(&self) {
        self.shared.images.log_stats();
        self.shared.data.log_stats();
    }
}
