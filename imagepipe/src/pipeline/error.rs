//! Error types delivered to request observers.
//!
//! Every observer of a shared unit of work receives the same error, so the
//! error is `Clone` and keeps its underlying cause behind an `Arc`.

use crate::decoder::DecodeError;
use crate::loader::DataLoadError;
use crate::processor::ProcessError;
use std::sync::Arc;
use thiserror::Error;

/// Terminal failure of a request.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The observer cancelled its own request
    #[error("request cancelled")]
    Cancelled,

    /// The loader failed
    #[error("data loading failed: {0}")]
    DataLoadingFailed(Arc<DataLoadError>),

    /// The loader finished without producing any bytes
    #[error("data is empty")]
    DataIsEmpty,

    /// The payload could not be decoded
    #[error("decoding failed: {0}")]
    DecodingFailed(Arc<DecodeError>),

    /// A processor rejected the image
    #[error("processor '{processor}' failed: {source}")]
    ProcessingFailed {
        processor: String,
        source: Arc<ProcessError>,
    },

    /// The pipeline was invalidated while the request was outstanding
    #[error("pipeline invalidated")]
    PipelineInvalidated,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the loader error behind a `DataLoadingFailed`.
    pub fn data_loading_error(&self) -> Option<&DataLoadError> {
        match self {
            Self::DataLoadingFailed(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<DataLoadError> for PipelineError {
    fn from(err: DataLoadError) -> Self {
        Self::DataLoadingFailed(Arc::new(err))
    }
}

impl From<DecodeError> for PipelineError {
    fn from(err: DecodeError) -> Self {
        Self::DecodingFailed(Arc::new(err))
    }
}
