//! Image request descriptors.
//!
//! An [`ImageRequest`] names the resource to load (a locator string or an
//! inline data supplier), the ordered processors to apply after decoding,
//! and the priority to schedule it with. Requests are immutable once built
//! and cheap to clone.

use crate::loader::DataLoadError;
use crate::priority::Priority;
use crate::processor::ImageProcessing;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Closure producing the bytes of an inline-data request.
///
/// Called at most once per unit of work, on the runtime that runs the work.
pub type DataSupplier =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Bytes, DataLoadError>> + Send + Sync>;

#[derive(Clone)]
enum Resource {
    Locator(String),
    Data { id: String, supplier: DataSupplier },
}

/// Describes one image to load.
///
/// # Example
///
/// ```
/// use imagepipe::{ImageRequest, Priority};
///
/// let request = ImageRequest::new("https://example.com/photo.jpeg")
///     .with_priority(Priority::High);
///
/// assert_eq!(request.locator(), Some("https://example.com/photo.jpeg"));
/// assert_eq!(request.priority(), Priority::High);
/// ```
#[derive(Clone)]
pub struct ImageRequest {
    resource: Resource,
    processors: Vec<Arc<dyn ImageProcessing>>,
    priority: Priority,
    image_id: Option<String>,
}

impl ImageRequest {
    /// Creates a request for a locator (URL or filesystem path).
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            resource: Resource::Locator(locator.into()),
            processors: Vec::new(),
            priority: Priority::default(),
            image_id: None,
        }
    }

    /// Creates a request whose bytes come from `supplier` instead of a loader.
    ///
    /// `id` identifies the image for caching and coalescing.
    pub fn from_data<F, Fut>(id: impl Into<String>, supplier: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, DataLoadError>> + Send + 'static,
    {
        let supplier: DataSupplier = Arc::new(move || supplier().boxed());
        Self {
            resource: Resource::Data {
                id: id.into(),
                supplier,
            },
            processors: Vec::new(),
            priority: Priority::default(),
            image_id: None,
        }
    }

    /// Appends a processor. Processors run in the order they were added.
    pub fn with_processor(mut self, processor: impl ImageProcessing) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Replaces the processor list.
    pub fn with_processors(mut self, processors: Vec<Arc<dyn ImageProcessing>>) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the identity used for cache keys and coalescing.
    ///
    /// Useful when several locators (e.g. signed URLs) point at the same image.
    pub fn with_image_id(mut self, id: impl Into<String>) -> Self {
        self.image_id = Some(id.into());
        self
    }

    /// Returns the locator, or `None` for inline-data requests.
    pub fn locator(&self) -> Option<&str> {
        match &self.resource {
            Resource::Locator(locator) => Some(locator),
            Resource::Data { .. } => None,
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn processors(&self) -> &[Arc<dyn ImageProcessing>] {
        &self.processors
    }

    /// Returns the processor identifiers in application order.
    pub fn processor_identifiers(&self) -> Vec<String> {
        self.processors
            .iter()
            .map(|p| p.identifier().to_string())
            .collect()
    }

    /// Returns the normalized resource identity.
    pub fn image_id(&self) -> String {
        if let Some(id) = &self.image_id {
            return id.clone();
        }
        match &self.resource {
            Resource::Locator(locator) => normalize_locator(locator),
            Resource::Data { id, .. } => id.clone(),
        }
    }

    pub(crate) fn data_supplier(&self) -> Option<&DataSupplier> {
        match &self.resource {
            Resource::Data { supplier, .. } => Some(supplier),
            Resource::Locator(_) => None,
        }
    }
}

impl From<&str> for ImageRequest {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

impl From<String> for ImageRequest {
    fn from(locator: String) -> Self {
        Self::new(locator)
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ImageRequest");
        match &self.resource {
            Resource::Locator(locator) => s.field("locator", locator),
            Resource::Data { id, .. } => s.field("data_id", id),
        };
        s.field("processors", &self.processor_identifiers())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Normalizes a locator into a resource identity.
///
/// For `scheme://authority/...` locators the scheme and authority are
/// lowercased and any `#fragment` is dropped; path and query are kept
/// verbatim. Anything else is only trimmed.
pub fn normalize_locator(locator: &str) -> String {
    let locator = locator.trim();
    let Some(scheme_end) = locator.find("://") else {
        return locator.to_string();
    };

    let without_fragment = match locator.find('#') {
        Some(idx) if idx > scheme_end => &locator[..idx],
        _ => locator,
    };

    let authority_start = scheme_end + 3;
    let authority_end = without_fragment[authority_start..]
        .find(['/', '?'])
        .map(|idx| authority_start + idx)
        .unwrap_or(without_fragment.len());

    let mut normalized = String::with_capacity(without_fragment.len());
    normalized.push_str(&without_fragment[..authority_end].to_lowercase());
    normalized.push_str(&without_fragment[authority_end..]);
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::AnonymousProcessor;

    #[test]
    fn test_normalize_lowercases_scheme_and_host_only() {
        assert_eq!(
            normalize_locator("HTTPS://Example.COM/Images/Photo.JPEG?Size=Large"),
            "https://example.com/Images/Photo.JPEG?Size=Large"
        );
    }

    #[test]
    fn test_normalize_drops_fragment_and_whitespace() {
        assert_eq!(
            normalize_locator("  https://example.com/a.png#section "),
            "https://example.com/a.png"
        );
        assert_eq!(
            normalize_locator("https://example.com?x=1"),
            "https://example.com?x=1"
        );
    }

    #[test]
    fn test_normalize_leaves_paths_alone() {
        assert_eq!(normalize_locator("/tmp/Images/a.png"), "/tmp/Images/a.png");
        assert_eq!(normalize_locator("relative/A.png"), "relative/A.png");
    }

    #[test]
    fn test_image_id_prefers_override() {
        let request = ImageRequest::new("https://cdn.example.com/a.png?sig=123")
            .with_image_id("avatar-42");
        assert_eq!(request.image_id(), "avatar-42");
    }

    #[test]
    fn test_inline_data_request_has_no_locator() {
        let request = ImageRequest::from_data("inline", || async { Ok(Bytes::new()) });
        assert_eq!(request.locator(), None);
        assert_eq!(request.image_id(), "inline");
        assert!(request.data_supplier().is_some());
    }

    #[test]
    fn test_processor_identifiers_keep_order() {
        let request = ImageRequest::new("a.png")
            .with_processor(AnonymousProcessor::new("resize", Ok))
            .with_processor(AnonymousProcessor::new("blur", Ok));
        assert_eq!(request.processor_identifiers(), vec!["resize", "blur"]);
    }
}
