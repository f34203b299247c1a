//! Decoding seam.

use crate::container::ImageContainer;
use bytes::Bytes;
use std::io::Cursor;
use thiserror::Error;

/// Errors produced while decoding bytes into an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Bytes do not start with any known image signature
    #[error("unrecognized image format")]
    UnknownFormat,

    /// The image crate rejected the payload
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    /// The blocking decode task panicked or was aborted
    #[error("decode task failed: {0}")]
    TaskFailed(String),
}

/// Turns a complete payload into an image container.
///
/// Called on the blocking pool, so implementations may do CPU-heavy work.
pub trait ImageDecoding: Send + Sync + 'static {
    fn decode(&self, data: &Bytes) -> Result<ImageContainer, DecodeError>;
}

/// Decoder backed by the `image` crate's format detection.
///
/// Keeps the encoded bytes on the container.
#[derive(Debug, Clone, Default)]
pub struct DefaultImageDecoder;

impl ImageDecoding for DefaultImageDecoder {
    fn decode(&self, data: &Bytes) -> Result<ImageContainer, DecodeError> {
        let reader = image::ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?;
        if reader.format().is_none() {
            return Err(DecodeError::UnknownFormat);
        }
        let decoded = reader.decode()?;
        Ok(ImageContainer::new(decoded).with_data(data.clone()))
    }
}
