//! Data loading capability.
//!
//! A [`DataLoading`] implementation turns a request into a stream of byte
//! chunks. The pipeline aggregates the chunks, reports progress from them and
//! stops polling the stream (dropping it) as soon as the work is cancelled.
//!
//! Two implementations ship with the crate, plus a router:
//!
//! - [`FileDataLoader`] for filesystem paths and `file://` locators
//! - [`HttpDataLoader`] for `http://` and `https://` locators
//! - [`DefaultDataLoader`] choosing between them by scheme

mod file;
mod http;

pub use file::{FileDataLoader, DEFAULT_CHUNK_SIZE};
pub use http::{HttpDataLoader, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT};

use crate::request::ImageRequest;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// One piece of a payload as it arrives from a loader.
#[derive(Debug, Clone)]
pub struct DataChunk {
    pub data: Bytes,
    /// Total payload length, when the loader knows it.
    pub expected_length: Option<u64>,
}

impl DataChunk {
    pub fn new(data: Bytes, expected_length: Option<u64>) -> Self {
        Self {
            data,
            expected_length,
        }
    }
}

/// Stream of chunks produced by a loader.
pub type DataStream = BoxStream<'static, Result<DataChunk, DataLoadError>>;

/// Why the network refused a request.
///
/// Mirrors the platform "low data mode" restrictions: callers typically
/// re-submit a cheaper request when they see one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkUnavailableReason {
    Cellular,
    Expensive,
    Constrained,
}

impl fmt::Display for NetworkUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cellular => "cellular access disallowed",
            Self::Expensive => "expensive network access disallowed",
            Self::Constrained => "constrained network access disallowed",
        };
        f.write_str(s)
    }
}

/// Errors produced while fetching bytes.
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// The network path was rejected by policy
    #[error("network unavailable: {0}")]
    NetworkUnavailable(NetworkUnavailableReason),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Transport-level HTTP failure
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No loader handles this locator
    #[error("unsupported locator: {0}")]
    UnsupportedLocator(String),

    /// Anything else, typically from custom loaders or inline suppliers
    #[error("{0}")]
    Other(String),
}

impl DataLoadError {
    /// Returns the policy reason when the failure was a network restriction.
    pub fn network_unavailable_reason(&self) -> Option<NetworkUnavailableReason> {
        match self {
            Self::NetworkUnavailable(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Capability to fetch the raw bytes behind a request.
///
/// The returned stream must stop producing chunks once `cancellation` fires
/// or when it is dropped, whichever comes first.
pub trait DataLoading: Send + Sync + 'static {
    fn load_data(&self, request: &ImageRequest, cancellation: CancellationToken) -> DataStream;
}

/// Routes `http(s)://` locators to HTTP and everything else to the filesystem.
pub struct DefaultDataLoader {
    file: FileDataLoader,
    http: HttpDataLoader,
}

impl DefaultDataLoader {
    pub fn new(file: FileDataLoader, http: HttpDataLoader) -> Self {
        Self { file, http }
    }

    /// Builds both loaders with their default settings.
    pub fn try_default() -> Result<Self, DataLoadError> {
        Ok(Self::new(FileDataLoader::default(), HttpDataLoader::new()?))
    }
}

impl DataLoading for DefaultDataLoader {
    fn load_data(&self, request: &ImageRequest, cancellation: CancellationToken) -> DataStream {
        let Some(locator) = request.locator() else {
            let id = request.image_id();
            return stream::once(async move { Err(DataLoadError::UnsupportedLocator(id)) })
                .boxed();
        };

        if is_http(locator) {
            self.http.load_data(request, cancellation)
        } else {
            self.file.load_data(request, cancellation)
        }
    }
}

fn is_http(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
