//! Read-only inspection of caches.
//!
//! - [`ImageCacheDebugInfo`] describes memory cache entries
//! - [`DataCacheDebugInfo`] describes files in a disk cache directory
//! - [`ByteCountFormatter`] and [`KindClassifier`] are passed explicitly to
//!   the methods that need them, so callers control formatting and rules

mod disk;
mod format;
mod memory;

pub use disk::DataCacheDebugInfo;
pub use format::{ByteCountFormatter, ByteUnit};
pub use memory::{locator_from, processors_summary, ImageCacheDebugInfo, KindClassifier};
