//! Memory caching of decoded images.
//!
//! Keys are derived from requests by [`ImageCacheKey`]; storage goes through
//! the [`ImageCaching`] trait so the pipeline can run with the bundled LRU
//! [`ImageCache`], a [`NoOpImageCache`], or a caller-provided store.

mod key;
mod memory;
mod r#trait;

pub use key::ImageCacheKey;
pub use memory::{
    CacheStats, ImageCache, ImageCacheConfig, DEFAULT_COST_LIMIT, DEFAULT_ENTRY_COST_RATIO,
};
pub use r#trait::{ImageCaching, NoOpImageCache};
