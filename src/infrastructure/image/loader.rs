//! Load orchestrator.
//!
//! Walks an item's candidate list against the cache, fetching on a miss and
//! deciding per attempt whether to succeed, retry, advance or stop.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::application::services::{AttemptResult, CandidateResolver, RetryPolicy, classify};
use crate::domain::entities::{
    CandidateList, CatalogItem, ImageDescriptor, ImagePayload, PresentationContext,
};
use crate::domain::errors::ErrorKind;
use crate::domain::ports::CatalogPort;

use super::fetch_pool::FetchPool;
use super::memory_cache::{CacheLease, ImageCache};

/// State reported to the renderer for one load.
#[derive(Debug, Clone)]
pub enum ImageLoadEvent {
    /// Emitted once, before any fetch.
    Loading,
    /// A candidate loaded.
    Success(LoadedImage),
    /// The chain ended without an image.
    Error(ErrorKind),
}

impl ImageLoadEvent {
    /// Returns true for `Success` and `Error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// A loaded image pinned in the cache for as long as this value lives.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Item the image belongs to.
    pub item_id: String,
    /// Candidate that succeeded.
    pub descriptor: ImageDescriptor,
    /// Render lease on the cached payload.
    pub lease: CacheLease,
}

impl LoadedImage {
    /// Decoded image.
    #[must_use]
    pub const fn payload(&self) -> &ImagePayload {
        self.lease.payload()
    }
}

/// Façade used by presentation code to load artwork.
pub struct ImageLoader {
    cache: Arc<ImageCache>,
    pool: FetchPool,
    resolver: CandidateResolver,
    catalog: Option<Arc<dyn CatalogPort>>,
    retry: RetryPolicy,
}

impl ImageLoader {
    /// Creates a loader without a catalog.
    #[must_use]
    pub const fn new(
        cache: Arc<ImageCache>,
        pool: FetchPool,
        resolver: CandidateResolver,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            pool,
            resolver,
            catalog: None,
            retry,
        }
    }

    /// Attaches the catalog used by [`Self::load_image_by_id`].
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogPort>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Cache shared with prefetch.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Resolver used for candidate lists.
    #[must_use]
    pub const fn resolver(&self) -> &CandidateResolver {
        &self.resolver
    }

    /// Candidate list without loading anything, e.g. for warm-up.
    #[must_use]
    pub fn resolve(&self, item: &CatalogItem, context: PresentationContext) -> CandidateList {
        self.resolver.resolve(item, context)
    }

    /// Loads artwork for `item` as `Loading` followed by at most one terminal event.
    ///
    /// Dropping the stream abandons the caller's interest; a fetch already in
    /// flight still completes into the cache.
    pub fn load_image(
        self: &Arc<Self>,
        item: &CatalogItem,
        context: PresentationContext,
    ) -> BoxStream<'static, ImageLoadEvent> {
        let loader = Arc::clone(self);
        let item = item.clone();

        stream::once(async { ImageLoadEvent::Loading })
            .chain(
                stream::once(async move { loader.load(&item, context).await })
                    .filter_map(std::future::ready),
            )
            .boxed()
    }

    /// Looks the item up in the catalog, then behaves like [`Self::load_image`].
    /// An unknown id ends in `Error(NotFound)`.
    pub fn load_image_by_id(
        self: &Arc<Self>,
        id: &str,
        context: PresentationContext,
    ) -> BoxStream<'static, ImageLoadEvent> {
        match self.catalog.as_ref().and_then(|catalog| catalog.item(id)) {
            Some(item) => self.load_image(&item, context),
            None => {
                warn!(item_id = id, "Item not in catalog");
                stream::iter([
                    ImageLoadEvent::Loading,
                    ImageLoadEvent::Error(ErrorKind::NotFound),
                ])
                .boxed()
            }
        }
    }

    /// Runs the fallback chain to a terminal event.
    ///
    /// Returns `None` when the work was cancelled; cancellation is never
    /// reported to the renderer.
    pub async fn load(
        &self,
        item: &CatalogItem,
        context: PresentationContext,
    ) -> Option<ImageLoadEvent> {
        let candidates = self.resolver.resolve(item, context);

        for candidate in &candidates {
            let Some(descriptor) = candidate.descriptor() else {
                break;
            };

            match self.attempt(descriptor).await {
                AttemptResult::Success(lease) => {
                    debug!(item_id = item.id(), role = %descriptor.role(), "Image loaded");
                    return Some(ImageLoadEvent::Success(LoadedImage {
                        item_id: item.id().to_string(),
                        descriptor: descriptor.clone(),
                        lease,
                    }));
                }
                AttemptResult::Advance(kind) | AttemptResult::Retryable(kind) => {
                    debug!(
                        item_id = item.id(),
                        role = %descriptor.role(),
                        %kind,
                        "Advancing to next candidate"
                    );
                }
                AttemptResult::Terminal(kind) => {
                    warn!(item_id = item.id(), %kind, "Stopping image load");
                    return Some(ImageLoadEvent::Error(kind));
                }
                AttemptResult::Cancelled => {
                    debug!(item_id = item.id(), "Image load cancelled");
                    return None;
                }
            }
        }

        debug!(item_id = item.id(), %context, "No candidate loaded");
        Some(ImageLoadEvent::Error(ErrorKind::NotFound))
    }

    /// One candidate, with transient failures retried per policy.
    async fn attempt(&self, descriptor: &ImageDescriptor) -> AttemptResult<CacheLease> {
        let url = descriptor.url();
        let mut retries = 0;

        loop {
            let result = self.cache.get_or_fill(url, self.pool.fetch(url)).await;
            if let Err(failure) = &result {
                warn!(url, error = %failure, kind = %classify(failure), "Image fetch failed");
            }

            match AttemptResult::from_result(result) {
                AttemptResult::Retryable(kind) if self.retry.allows_retry(retries) => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries);
                    debug!(url, retry = retries, ?delay, %kind, "Retrying image fetch");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio_test::{assert_pending, assert_ready};

    use crate::application::services::ImageSizing;
    use crate::domain::entities::{ImageRole, ItemKind};
    use crate::domain::errors::RawFetchFailure;
    use crate::domain::ports::FetchedBytes;
    use crate::domain::ports::mocks::{MockCatalogPort, ScriptedFetcher};
    use crate::infrastructure::image::fetch_pool::FetchPoolConfig;

    const SERVER: &str = "http://media.local";

    fn resolver() -> CandidateResolver {
        CandidateResolver::new(SERVER, ImageSizing::default())
    }

    fn loader(fetcher: &Arc<ScriptedFetcher>, retry: RetryPolicy) -> ImageLoader {
        ImageLoader::new(
            Arc::new(ImageCache::with_defaults()),
            FetchPool::new(fetcher.clone(), FetchPoolConfig::default()),
            resolver(),
            retry,
        )
    }

    fn url(item: &CatalogItem, context: PresentationContext, role: ImageRole) -> String {
        resolver()
            .resolve(item, context)
            .remote()
            .find(|d| d.role() == role)
            .map(|d| d.url().to_string())
            .unwrap()
    }

    fn episode() -> CatalogItem {
        CatalogItem::new("ep1", ItemKind::Episode)
            .with_image(ImageRole::Thumb, "t")
            .with_image(ImageRole::Backdrop, "b")
    }

    async fn events(stream: BoxStream<'static, ImageLoadEvent>) -> Vec<ImageLoadEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_not_found_exhausts_to_not_found() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let loader = Arc::new(loader(&fetcher, RetryPolicy::default()));
        let item = CatalogItem::new("ep1", ItemKind::Episode).with_image(ImageRole::Backdrop, "b");
        let backdrop = url(&item, PresentationContext::Episode, ImageRole::Backdrop);
        fetcher.respond_status(&backdrop, 404);

        let events = events(loader.load_image(&item, PresentationContext::Episode)).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ImageLoadEvent::Loading));
        assert!(matches!(events[1], ImageLoadEvent::Error(ErrorKind::NotFound)));
        assert_eq!(fetcher.calls(), vec![backdrop]);
    }

    #[tokio::test]
    async fn test_auth_failure_short_circuits() {
        for (status, kind) in [(401, ErrorKind::Unauthorized), (403, ErrorKind::Forbidden)] {
            let fetcher = Arc::new(ScriptedFetcher::serving_images());
            let loader = Arc::new(loader(&fetcher, RetryPolicy::default()));
            let item = episode();
            let thumb = url(&item, PresentationContext::Episode, ImageRole::Thumb);
            fetcher.respond_status(&thumb, status);

            let events = events(loader.load_image(&item, PresentationContext::Episode)).await;

            assert_eq!(events.len(), 2);
            assert!(matches!(events[1], ImageLoadEvent::Error(k) if k == kind));
            assert_eq!(fetcher.calls(), vec![thumb]);
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_next_candidate() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();
        fetcher.respond_status(&url(&item, PresentationContext::Episode, ImageRole::Thumb), 404);

        let event = loader.load(&item, PresentationContext::Episode).await;

        let Some(ImageLoadEvent::Success(loaded)) = event else {
            panic!("expected success");
        };
        assert_eq!(loaded.item_id, "ep1");
        assert_eq!(loaded.descriptor.role(), ImageRole::Backdrop);
        assert_eq!(loaded.payload().width(), 4);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_image_falls_back() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();
        fetcher.respond(
            &url(&item, PresentationContext::Episode, ImageRole::Thumb),
            Ok(FetchedBytes::new(200, Bytes::from_static(b"garbage"))),
        );

        let event = loader.load(&item, PresentationContext::Episode).await;

        assert!(matches!(
            event,
            Some(ImageLoadEvent::Success(ref loaded)) if loaded.descriptor.role() == ImageRole::Backdrop
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();
        let thumb = url(&item, PresentationContext::Episode, ImageRole::Thumb);
        fetcher.respond(&thumb, Err(RawFetchFailure::transport("connection reset")));
        fetcher.respond_image(&thumb);

        let started = tokio::time::Instant::now();
        let event = loader.load(&item, PresentationContext::Episode).await;

        assert!(matches!(event, Some(ImageLoadEvent::Success(_))));
        assert_eq!(fetcher.call_count(&thumb), 2);
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();
        let thumb = url(&item, PresentationContext::Episode, ImageRole::Thumb);
        fetcher.respond_status(&thumb, 500);
        fetcher.respond_image(&thumb);

        let event = loader.load(&item, PresentationContext::Episode).await;

        let Some(ImageLoadEvent::Success(loaded)) = event else {
            panic!("expected success");
        };
        assert_eq!(loaded.descriptor.role(), ImageRole::Thumb);
        assert_eq!(fetcher.call_count(&thumb), 2);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded_then_advance() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().with_fallback(Err(RawFetchFailure::Timeout)),
        );
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();

        let event = loader.load(&item, PresentationContext::Episode).await;

        assert!(matches!(event, Some(ImageLoadEvent::Error(ErrorKind::NotFound))));
        assert_eq!(
            fetcher.call_count(&url(&item, PresentationContext::Episode, ImageRole::Thumb)),
            3
        );
        assert_eq!(
            fetcher.call_count(&url(&item, PresentationContext::Episode, ImageRole::Backdrop)),
            3
        );
    }

    #[tokio::test]
    async fn test_cached_image_skips_network() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();
        let thumb = url(&item, PresentationContext::Episode, ImageRole::Thumb);
        loader.cache().put(
            &thumb,
            ImagePayload::from_image(image::DynamicImage::new_rgb8(8, 8)),
        );

        let event = loader.load(&item, PresentationContext::Episode).await;

        let Some(ImageLoadEvent::Success(loaded)) = event else {
            panic!("expected success");
        };
        assert_eq!(loaded.payload().width(), 8);
        assert!(fetcher.calls().is_empty());
        assert!(loader.cache().peek(&thumb).unwrap().in_use);

        drop(loaded);
        assert!(!loader.cache().peek(&thumb).unwrap().in_use);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_fetch() {
        let fetcher = Arc::new(
            ScriptedFetcher::serving_images().with_delay(Duration::from_millis(20)),
        );
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();

        let (a, b) = tokio::join!(
            loader.load(&item, PresentationContext::Episode),
            loader.load(&item, PresentationContext::Episode)
        );

        assert!(matches!(a, Some(ImageLoadEvent::Success(_))));
        assert!(matches!(b, Some(ImageLoadEvent::Success(_))));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_load_still_fills_cache() {
        let fetcher = Arc::new(
            ScriptedFetcher::serving_images().with_delay(Duration::from_millis(100)),
        );
        let loader = loader(&fetcher, RetryPolicy::default());
        let item = episode();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            loader.load(&item, PresentationContext::Episode),
        )
        .await;
        assert!(abandoned.is_err());

        let event = loader.load(&item, PresentationContext::Episode).await;

        assert!(matches!(event, Some(ImageLoadEvent::Success(_))));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_loading_is_emitted_before_fetch_completes() {
        let fetcher = Arc::new(
            ScriptedFetcher::serving_images().with_delay(Duration::from_secs(5)),
        );
        let loader = Arc::new(loader(&fetcher, RetryPolicy::default()));

        let mut events =
            tokio_test::task::spawn(loader.load_image(&episode(), PresentationContext::Episode));

        let first = assert_ready!(events.poll_next());
        assert!(matches!(first, Some(ImageLoadEvent::Loading)));
        assert_pending!(events.poll_next());
    }

    #[tokio::test]
    async fn test_load_by_id_uses_catalog() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let mut catalog = MockCatalogPort::new();
        catalog
            .expect_item()
            .returning(|id| (id == "ep1").then(episode));
        let loader = Arc::new(loader(&fetcher, RetryPolicy::default()).with_catalog(Arc::new(catalog)));

        let found = events(loader.load_image_by_id("ep1", PresentationContext::Episode)).await;
        assert!(matches!(found[1], ImageLoadEvent::Success(_)));

        let missing = events(loader.load_image_by_id("nope", PresentationContext::Episode)).await;
        assert_eq!(missing.len(), 2);
        assert!(matches!(missing[0], ImageLoadEvent::Loading));
        assert!(matches!(missing[1], ImageLoadEvent::Error(ErrorKind::NotFound)));
    }

    #[tokio::test]
    async fn test_item_without_images_is_not_found() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let loader = loader(&fetcher, RetryPolicy::none());

        let event = loader
            .load(&CatalogItem::new("lib", ItemKind::Library), PresentationContext::Library)
            .await;

        assert!(matches!(event, Some(ImageLoadEvent::Error(ErrorKind::NotFound))));
        assert!(fetcher.calls().is_empty());
        assert!(event.is_some_and(|e| e.is_terminal()));
    }
}
