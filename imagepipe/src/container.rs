//! Decoded artifacts and the responses that carry them.

use bytes::Bytes;
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

/// A decoded image together with the bytes it was decoded from.
///
/// Cloning is cheap: the bitmap is shared behind an `Arc`. Containers are
/// never mutated once built, so a cached container can be handed to any
/// number of observers.
#[derive(Clone)]
pub struct ImageContainer {
    image: Arc<DynamicImage>,
    data: Option<Bytes>,
}

impl ImageContainer {
    /// Wraps a decoded image.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            data: None,
        }
    }

    /// Attaches the encoded bytes the image was decoded from.
    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns the decoded image.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Returns the original encoded bytes, if retained.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns the in-memory cost of the decoded bitmap in bytes.
    ///
    /// This is what the memory cache charges against its cost limit.
    pub fn cost(&self) -> usize {
        let bytes_per_pixel = self.image.color().bytes_per_pixel() as usize;
        self.width() as usize * self.height() as usize * bytes_per_pixel
    }

    /// Returns true if both containers share the same decoded bitmap.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl fmt::Debug for ImageContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageContainer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("cost", &self.cost())
            .field("data_len", &self.data.as_ref().map(Bytes::len))
            .finish()
    }
}

/// Where a response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// Served from the memory cache without touching the loader.
    Memory,
}

/// Successful result of an image request.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    /// The decoded (and processed) image.
    pub container: ImageContainer,
    /// The locator the image was loaded from, if the request had one.
    pub locator: Option<String>,
    /// `Some` when served from a cache.
    pub cache_type: Option<CacheType>,
}

impl ImageResponse {
    pub fn image(&self) -> &DynamicImage {
        self.container.image()
    }

    /// Builds a response served from the memory cache.
    pub(crate) fn from_cache(container: ImageContainer, locator: Option<String>) -> Self {
        Self {
            container,
            locator,
            cache_type: Some(CacheType::Memory),
        }
    }
}

/// Successful result of a raw data request.
#[derive(Debug, Clone)]
pub struct DataResponse {
    /// The complete payload.
    pub data: Bytes,
    /// The locator the data was loaded from, if the request had one.
    pub locator: Option<String>,
}
