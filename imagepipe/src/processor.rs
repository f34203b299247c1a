//! Processing seam.
//!
//! Processors transform a decoded container into another one. The crate
//! ships no pixel operations of its own; [`AnonymousProcessor`] adapts a
//! closure for callers that bring their own.

use crate::container::ImageContainer;
use std::fmt;
use thiserror::Error;

/// Failure reported by a processor.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A transformation applied after decoding.
///
/// The identifier participates in cache keys: two processors with the same
/// identifier must produce the same output for the same input.
pub trait ImageProcessing: Send + Sync + 'static {
    fn identifier(&self) -> &str;

    fn process(&self, container: ImageContainer) -> Result<ImageContainer, ProcessError>;
}

/// Closure-backed processor.
pub struct AnonymousProcessor<F> {
    identifier: String,
    closure: F,
}

impl<F> AnonymousProcessor<F>
where
    F: Fn(ImageContainer) -> Result<ImageContainer, ProcessError> + Send + Sync + 'static,
{
    pub fn new(identifier: impl Into<String>, closure: F) -> Self {
        Self {
            identifier: identifier.into(),
            closure,
        }
    }
}

impl<F> ImageProcessing for AnonymousProcessor<F>
where
    F: Fn(ImageContainer) -> Result<ImageContainer, ProcessError> + Send + Sync + 'static,
{
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn process(&self, container: ImageContainer) -> Result<ImageContainer, ProcessError> {
        (self.closure)(container)
    }
}

impl<F> fmt::Debug for AnonymousProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymousProcessor")
            .field("identifier", &self.identifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    #[test]
    fn test_anonymous_processor_runs_closure() {
        let grayscale = AnonymousProcessor::new("grayscale", |c: ImageContainer| {
            Ok(ImageContainer::new(c.image().grayscale()))
        });
        let output = grayscale
            .process(ImageContainer::new(DynamicImage::new_rgba8(2, 2)))
            .unwrap();

        assert_eq!(grayscale.identifier(), "grayscale");
        assert_eq!(output.image().color(), image::ColorType::La8);
    }

    #[test]
    fn test_anonymous_processor_propagates_errors() {
        let failing = AnonymousProcessor::new("fail", |_| Err(ProcessError::new("nope")));
        let err = failing
            .process(ImageContainer::new(DynamicImage::new_rgba8(1, 1)))
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
