//! HTTP loader built on reqwest.

use super::{DataChunk, DataLoadError, DataLoading, DataStream};
use crate::request::ImageRequest;
use futures::{stream, StreamExt, TryFutureExt, TryStreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = concat!("imagepipe/", env!("CARGO_PKG_VERSION"));

/// Streams response bodies over HTTP(S).
///
/// Non-success statuses fail with [`DataLoadError::Status`]. The
/// `Content-Length` header, when present, becomes the expected length.
#[derive(Clone)]
pub struct HttpDataLoader {
    client: reqwest::Client,
}

impl HttpDataLoader {
    /// Creates a loader with the default timeout and user agent.
    pub fn new() -> Result<Self, DataLoadError> {
        Self::with_settings(DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT)
    }

    pub fn with_settings(timeout: Duration, user_agent: &str) -> Result<Self, DataLoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl DataLoading for HttpDataLoader {
    fn load_data(&self, request: &ImageRequest, cancellation: CancellationToken) -> DataStream {
        let Some(url) = request.locator().map(str::to_string) else {
            let id = request.image_id();
            return stream::once(async move { Err(DataLoadError::UnsupportedLocator(id)) })
                .boxed();
        };

        let client = self.client.clone();
        let response = async move {
            trace!(url = %url, "HTTP GET request starting");
            let response = client.get(&url).send().await.map_err(|e| {
                warn!(
                    url = %url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                DataLoadError::Transport(e)
            })?;

            let status = response.status();
            debug!(url = %url, status = status.as_u16(), "HTTP response received");
            if !status.is_success() {
                return Err(DataLoadError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            let expected = response.content_length();
            Ok(response
                .bytes_stream()
                .map_ok(move |data| DataChunk::new(data, expected))
                .map_err(DataLoadError::Transport))
        };

        response
            .try_flatten_stream()
            .take_until(cancellation.cancelled_owned())
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        assert!(DEFAULT_USER_AGENT.starts_with("imagepipe/"));
    }

    #[test]
    fn test_builds_with_custom_settings() {
        assert!(HttpDataLoader::with_settings(Duration::from_secs(5), "test-agent").is_ok());
    }
}
