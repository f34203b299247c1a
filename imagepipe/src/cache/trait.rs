//! Cache trait definition for dependency injection.

use crate::cache::key::ImageCacheKey;
use crate::container::ImageContainer;

/// Memory cache capability used by the pipeline.
///
/// Implementations must be safe to call from any thread. The pipeline calls
/// `get` and `set` while holding its coalescing lock, so implementations must
/// never call back into the pipeline.
///
/// # Example
///
/// ```
/// use imagepipe::cache::{ImageCache, ImageCacheKey, ImageCaching};
/// use imagepipe::ImageContainer;
/// use image::DynamicImage;
///
/// let cache = ImageCache::default();
/// let key = ImageCacheKey::custom("avatar");
///
/// cache.set(key.clone(), ImageContainer::new(DynamicImage::new_rgba8(4, 4)));
/// assert!(cache.contains(&key));
///
/// cache.remove_all();
/// assert!(cache.get(&key).is_none());
/// ```
pub trait ImageCaching: Send + Sync + 'static {
    /// Returns the cached container for `key`, if any.
    fn get(&self, key: &ImageCacheKey) -> Option<ImageContainer>;

    /// Stores or replaces the container for `key`.
    fn set(&self, key: ImageCacheKey, container: ImageContainer);

    /// Removes and returns the container for `key`.
    fn remove(&self, key: &ImageCacheKey) -> Option<ImageContainer>;

    /// Removes every entry atomically.
    fn remove_all(&self);

    fn contains(&self, key: &ImageCacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Sum of entry costs in bytes.
    fn total_cost(&self) -> usize;

    /// Number of stored entries.
    fn total_count(&self) -> usize;

    /// Snapshot of the stored entries for inspection, most recently used first.
    fn debug_entries(&self) -> Vec<(ImageCacheKey, ImageContainer)> {
        Vec::new()
    }
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpImageCache;

impl ImageCaching for NoOpImageCache {
    fn get(&self, _key: &ImageCacheKey) -> Option<ImageContainer> {
        None
    }

    fn set(&self, _key: ImageCacheKey, _container: ImageContainer) {}

    fn remove(&self, _key: &ImageCacheKey) -> Option<ImageContainer> {
        None
    }

    fn remove_all(&self) {}

    fn total_cost(&self) -> usize {
        0
    }

    fn total_count(&self) -> usize {
        0
    }
}
