//! Bounded network fetch and decode shared by on-demand loads and prefetch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::domain::entities::ImagePayload;
use crate::domain::errors::RawFetchFailure;
use crate::domain::ports::ImageFetcherPort;

/// Default cap on concurrently running network fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 6;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the fetch pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPoolConfig {
    /// Maximum network fetches running at once.
    pub max_concurrent: usize,
    /// Timeout for one fetch, not counting time spent waiting for a slot.
    pub timeout: Duration,
}

impl Default for FetchPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Caps in-flight fetches independent of how many callers want images.
#[derive(Clone)]
pub struct FetchPool {
    fetcher: Arc<dyn ImageFetcherPort>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl FetchPool {
    /// Creates a pool over `fetcher` with the configured limits.
    #[must_use]
    pub fn new(fetcher: Arc<dyn ImageFetcherPort>, config: FetchPoolConfig) -> Self {
        Self {
            fetcher,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: config.timeout,
        }
    }

    /// Fetches and decodes `url`.
    ///
    /// The returned future owns everything it needs, so it can be handed to
    /// [`ImageCache::get_or_fill`](super::ImageCache::get_or_fill) and run
    /// detached from the caller.
    pub fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<ImagePayload, RawFetchFailure>> + Send + use<> {
        let fetcher = Arc::clone(&self.fetcher);
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;
        let url = url.to_string();

        async move {
            let body = {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| RawFetchFailure::Cancelled)?;

                debug!(url = %url, "Fetching image");
                let response = tokio::time::timeout(timeout, fetcher.fetch(&url))
                    .await
                    .map_err(|_| RawFetchFailure::Timeout)??;

                if !response.is_success() {
                    debug!(url = %url, status = response.status, "Image fetch failed");
                    return Err(RawFetchFailure::status(response.status));
                }
                response.bytes
            };

            let payload = decode(body).await?;
            trace!(
                url = %url,
                width = payload.width(),
                height = payload.height(),
                "Decoded image"
            );
            Ok(payload)
        }
    }

    /// Number of fetch slots currently free.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuses new fetches; waiting callers fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    /// Returns true once [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }
}

impl std::fmt::Debug for FetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPool")
            .field("available_permits", &self.available_permits())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Decodes image bytes off the async runtime.
///
/// # Errors
/// Returns `RawFetchFailure::Decode` if the bytes are not a supported image.
pub async fn decode(bytes: Bytes) -> Result<ImagePayload, RawFetchFailure> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| RawFetchFailure::decode(format!("decode task failed: {e}")))?
        .map(ImagePayload::from_image)
        .map_err(|e| RawFetchFailure::decode(e.to_string()))
}
