//! Filesystem loader.

use super::{DataChunk, DataLoadError, DataLoading, DataStream};
use crate::request::ImageRequest;
use bytes::Bytes;
use futures::{stream, StreamExt, TryFutureExt};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default read size (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads local files in fixed-size chunks.
///
/// Accepts plain paths and `file://` locators. The file length is reported
/// as the expected length of every chunk.
#[derive(Debug, Clone)]
pub struct FileDataLoader {
    chunk_size: usize,
}

impl FileDataLoader {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the read size. Zero is clamped to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for FileDataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoading for FileDataLoader {
    fn load_data(&self, request: &ImageRequest, cancellation: CancellationToken) -> DataStream {
        let Some(locator) = request.locator() else {
            let id = request.image_id();
            return stream::once(async move { Err(DataLoadError::UnsupportedLocator(id)) })
                .boxed();
        };

        let path = path_from_locator(locator);
        let chunk_size = self.chunk_size;
        debug!(path = %path.display(), chunk_size, "Reading file");

        let opened = async move {
            let file = File::open(&path).await?;
            let expected = file.metadata().await?.len();
            Ok::<_, DataLoadError>(stream::try_unfold(file, move |file| {
                read_chunk(file, chunk_size, expected)
            }))
        };

        opened
            .try_flatten_stream()
            .take_until(cancellation.cancelled_owned())
            .boxed()
    }
}

async fn read_chunk(
    mut file: File,
    chunk_size: usize,
    expected: u64,
) -> Result<Option<(DataChunk, File)>, DataLoadError> {
    let mut buf = vec![0u8; chunk_size];
    let n = file.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((DataChunk::new(Bytes::from(buf), Some(expected)), file)))
}

fn path_from_locator(locator: &str) -> PathBuf {
    let trimmed = locator.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("file://") => PathBuf::from(&trimmed[7..]),
        _ => PathBuf::from(trimmed),
    }
}
