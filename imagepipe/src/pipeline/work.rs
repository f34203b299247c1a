//! Execution of one unit of work.
//!
//! Each unit waits for a scheduler slot, fetches its bytes (publishing
//! progress as chunks arrive), then decodes and processes on the blocking
//! pool. Cancellation is observed at every await point: once the token
//! fires the future returns and drops the loader stream and its slot.

use crate::cache::ImageCacheKey;
use crate::container::{DataResponse, ImageContainer, ImageResponse};
use crate::decoder::{DecodeError, ImageDecoding};
use crate::loader::DataLoading;
use crate::pipeline::coalesce::{TaskRegistry, WorkId, WorkStart};
use crate::pipeline::error::PipelineError;
use crate::pipeline::PipelineShared;
use crate::processor::ImageProcessing;
use crate::request::ImageRequest;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Retires the unit if its future is dropped before completing.
///
/// After a normal completion the unit is already gone and this is a no-op.
struct AbandonOnDrop<K, T>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    registry: Arc<TaskRegistry<K, T>>,
    key: K,
    work_id: WorkId,
}

impl<K, T> Drop for AbandonOnDrop<K, T>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.registry.abandon(&self.key, self.work_id);
    }
}

pub(crate) async fn run_image(
    shared: Arc<PipelineShared>,
    request: ImageRequest,
    key: ImageCacheKey,
    start: WorkStart,
) {
    let WorkStart {
        work_id,
        cancellation,
        queued,
    } = start;
    let registry = Arc::clone(&shared.images);
    let _guard = AbandonOnDrop {
        registry: Arc::clone(&registry),
        key: key.clone(),
        work_id,
    };

    let load = async {
        let _permit = queued.admitted().await;
        debug!(key = %key, work_id = %work_id, "Image work running");

        let data = fetch(
            shared.config.data_loader.as_ref(),
            &request,
            cancellation.clone(),
            |completed, total| registry.publish_progress(&key, work_id, completed, total),
        )
        .await?;

        let decoder = Arc::clone(&shared.config.decoder);
        let processors = request.processors().to_vec();
        let container = tokio::task::spawn_blocking(move || {
            decode_and_process(decoder.as_ref(), &data, &processors)
        })
        .await
        .map_err(|e| PipelineError::from(DecodeError::TaskFailed(e.to_string())))??;

        Ok::<_, PipelineError>(ImageResponse {
            container,
            locator: request.locator().map(str::to_string),
            cache_type: None,
        })
    };

    let result = tokio::select! {
        biased;
        _ = cancellation.cancelled() => return,
        result = load => result,
    };

    let cache = shared.config.image_cache.as_ref();
    registry.complete(&key, work_id, result, |response| {
        if let Some(cache) = cache {
            cache.set(key.clone(), response.container.clone());
        }
    });
}

pub(crate) async fn run_data(
    shared: Arc<PipelineShared>,
    request: ImageRequest,
    key: String,
    start: WorkStart,
) {
    let WorkStart {
        work_id,
        cancellation,
        queued,
    } = start;
    let registry = Arc::clone(&shared.data);
    let _guard = AbandonOnDrop {
        registry: Arc::clone(&registry),
        key: key.clone(),
        work_id,
    };

    let load = async {
        let _permit = queued.admitted().await;
        debug!(key = %key, work_id = %work_id, "Data work running");

        let data = fetch(
            shared.config.data_loader.as_ref(),
            &request,
            cancellation.clone(),
            |completed, total| registry.publish_progress(&key, work_id, completed, total),
        )
        .await?;

        Ok::<_, PipelineError>(DataResponse {
            data,
            locator: request.locator().map(str::to_string),
        })
    };

    let result = tokio::select! {
        biased;
        _ = cancellation.cancelled() => return,
        result = load => result,
    };

    registry.complete(&key, work_id, result, |_| {});
}

/// Collects the full payload from the request's supplier or the loader.
async fn fetch(
    loader: &dyn DataLoading,
    request: &ImageRequest,
    cancellation: CancellationToken,
    on_progress: impl Fn(u64, u64),
) -> Result<Bytes, PipelineError> {
    if let Some(supplier) = request.data_supplier() {
        let data = supplier().await?;
        if data.is_empty() {
            return Err(PipelineError::DataIsEmpty);
        }
        return Ok(data);
    }

    let mut stream = loader.load_data(request, cancellation);
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk.data);
        on_progress(buffer.len() as u64, chunk.expected_length.unwrap_or(0));
    }

    if buffer.is_empty() {
        return Err(PipelineError::DataIsEmpty);
    }
    Ok(buffer.freeze())
}

fn decode_and_process(
    decoder: &dyn ImageDecoding,
    data: &Bytes,
    processors: &[Arc<dyn ImageProcessing>],
) -> Result<ImageContainer, PipelineError> {
    let mut container = decoder.decode(data)?;
    for processor in processors {
        container = processor
            .process(container)
            .map_err(|source| PipelineError::ProcessingFailed {
                processor: processor.identifier().to_string(),
                source: Arc::new(source),
            })?;
    }
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{DataChunk, DataLoadError, DataStream};
    use crate::processor::{AnonymousProcessor, ProcessError};
    use futures::stream;
    use image::DynamicImage;
    use parking_lot::Mutex;

    struct ChunkLoader(Vec<&'static [u8]>);

    impl DataLoading for ChunkLoader {
        fn load_data(&self, _: &ImageRequest, _: CancellationToken) -> DataStream {
            let total: usize = self.0.iter().map(|c| c.len()).sum();
            let chunks: Vec<Result<DataChunk, DataLoadError>> = self
                .0
                .iter()
                .map(|c| Ok(DataChunk::new(Bytes::from_static(*c), Some(total as u64))))
                .collect();
            stream::iter(chunks).boxed()
        }
    }

    struct FixedDecoder;

    impl ImageDecoding for FixedDecoder {
        fn decode(&self, _: &Bytes) -> Result<ImageContainer, DecodeError> {
            Ok(ImageContainer::new(DynamicImage::new_rgba8(2, 2)))
        }
    }

    #[tokio::test]
    async fn test_fetch_concatenates_and_reports_progress() {
        let loader = ChunkLoader(vec![&b"abc"[..], &b"de"[..]]);
        let seen = Mutex::new(Vec::new());

        let data = fetch(
            &loader,
            &ImageRequest::new("x"),
            CancellationToken::new(),
            |c, t| seen.lock().push((c, t)),
        )
        .await
        .unwrap();

        assert_eq!(&data[..], b"abcde");
        assert_eq!(*seen.lock(), vec![(3, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_fetch_empty_payload_fails() {
        let loader = ChunkLoader(vec![]);
        let result = fetch(
            &loader,
            &ImageRequest::new("x"),
            CancellationToken::new(),
            |_, _| {},
        )
        .await;
        assert!(matches!(result, Err(PipelineError::DataIsEmpty)));
    }

    #[tokio::test]
    async fn test_fetch_prefers_supplier() {
        let loader = ChunkLoader(vec![&b"from-loader"[..]]);
        let request =
            ImageRequest::from_data("inline", || async { Ok(Bytes::from_static(b"inline")) });

        let data = fetch(&loader, &request, CancellationToken::new(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(&data[..], b"inline");
    }

    #[test]
    fn test_processors_run_in_order_and_report_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let order = order.clone();
            AnonymousProcessor::new("first", move |c| {
                order.lock().push("first");
                Ok(c)
            })
        };
        let failing = {
            let order = order.clone();
            AnonymousProcessor::new("second", move |_| {
                order.lock().push("second");
                Err(ProcessError::new("bad"))
            })
        };
        let processors: Vec<Arc<dyn ImageProcessing>> = vec![Arc::new(first), Arc::new(failing)];

        let err = decode_and_process(&FixedDecoder, &Bytes::from_static(b"x"), &processors)
            .unwrap_err();

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert!(matches!(
            err,
            PipelineError::ProcessingFailed { processor, .. } if processor == "second"
        ));
    }
}
