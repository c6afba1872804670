//! Wires cache, fetch pool, loader and prefetch into one owned pipeline.

use std::sync::Arc;

use tracing::info;

use crate::application::services::CandidateResolver;
use crate::domain::entities::PresentationContext;
use crate::domain::errors::RawFetchFailure;
use crate::domain::ports::{CatalogPort, ImageFetcherPort};
use crate::infrastructure::config::AppConfig;

use super::fetch_pool::FetchPool;
use super::http_fetcher::HttpImageFetcher;
use super::loader::ImageLoader;
use super::memory_cache::ImageCache;
use super::prefetch::{PrefetchConfig, PrefetchScheduler};

/// Artwork pipeline built from configuration.
///
/// The cache lives exactly as long as the pipeline; every loader and
/// scheduler created from it shares that one cache and fetch pool.
pub struct ArtworkPipeline {
    cache: Arc<ImageCache>,
    pool: FetchPool,
    resolver: CandidateResolver,
    loader: Arc<ImageLoader>,
    prefetch: PrefetchConfig,
}

impl ArtworkPipeline {
    /// Builds the pipeline over `fetcher`. `catalog` enables loads by id.
    #[must_use]
    pub fn new(
        config: &AppConfig,
        fetcher: Arc<dyn ImageFetcherPort>,
        catalog: Option<Arc<dyn CatalogPort>>,
    ) -> Self {
        let cache = Arc::new(ImageCache::new(config.cache.to_cache_config()));
        let pool = FetchPool::new(fetcher, config.network.to_fetch_pool_config());
        let resolver = CandidateResolver::new(&config.server_url, config.images.to_sizing());

        let mut loader = ImageLoader::new(
            cache.clone(),
            pool.clone(),
            resolver.clone(),
            config.network.to_retry_policy(),
        );
        if let Some(catalog) = catalog {
            loader = loader.with_catalog(catalog);
        }

        info!(
            server = %config.server_url,
            max_bytes = config.cache.max_bytes,
            max_entries = config.cache.max_entries,
            "Artwork pipeline ready"
        );

        Self {
            cache,
            pool,
            resolver,
            loader: Arc::new(loader),
            prefetch: config.prefetch.to_prefetch_config(),
        }
    }

    /// Builds the pipeline over the HTTP fetcher.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_http(
        config: &AppConfig,
        catalog: Option<Arc<dyn CatalogPort>>,
    ) -> Result<Self, RawFetchFailure> {
        let fetcher = HttpImageFetcher::new(config.network.timeout())?;
        Ok(Self::new(config, Arc::new(fetcher), catalog))
    }

    /// Shared load orchestrator.
    #[must_use]
    pub const fn loader(&self) -> &Arc<ImageLoader> {
        &self.loader
    }

    /// Shared image cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Resolver built from the configured server and sizing.
    #[must_use]
    pub const fn resolver(&self) -> &CandidateResolver {
        &self.resolver
    }

    /// Creates a prefetch scheduler sharing this pipeline's cache and pool.
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn scheduler(&self, context: Option<PresentationContext>) -> PrefetchScheduler {
        let scheduler = PrefetchScheduler::new(
            self.prefetch,
            self.resolver.clone(),
            self.cache.clone(),
            self.pool.clone(),
        );
        match context {
            Some(context) => scheduler.with_context(context),
            None => scheduler,
        }
    }

    /// Stops new fetches and drops every cached image not in use.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.cache.clear();
        info!(stats = %self.cache.stats(), "Artwork pipeline shut down");
    }
}

impl std::fmt::Debug for ArtworkPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtworkPipeline")
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .field("prefetch", &self.prefetch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CatalogItem, ImageRole, ItemKind};
    use crate::domain::ports::mocks::ScriptedFetcher;
    use crate::infrastructure::image::ImageLoadEvent;

    fn movies(count: usize) -> Vec<CatalogItem> {
        (0..count)
            .map(|i| {
                CatalogItem::new(format!("m{i}"), ItemKind::Movie)
                    .with_image(ImageRole::Poster, format!("p{i}"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_prefetched_image_is_served_from_cache() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let pipeline = ArtworkPipeline::new(&AppConfig::default(), fetcher.clone(), None);
        let items = movies(10);

        let scheduler = pipeline.scheduler(None);
        scheduler.on_focus_changed(4, &items);
        scheduler.flush().await;
        assert_eq!(fetcher.calls().len(), 4);

        let event = pipeline
            .loader()
            .load(&items[5], PresentationContext::Poster)
            .await;

        assert!(matches!(event, Some(ImageLoadEvent::Success(_))));
        assert_eq!(fetcher.calls().len(), 4);
        assert!(pipeline.cache().stats().hits >= 1);
    }

    #[tokio::test]
    async fn test_server_url_comes_from_config() {
        let mut config = AppConfig::default();
        config.server_url = "http://tv.lan:8096/".to_string();
        let pipeline =
            ArtworkPipeline::new(&config, Arc::new(ScriptedFetcher::serving_images()), None);

        let list = pipeline
            .resolver()
            .resolve(&movies(1)[0], PresentationContext::Poster);

        assert!(list.primary().unwrap().url().starts_with("http://tv.lan:8096/Items/m0/"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_quietly() {
        let fetcher = Arc::new(ScriptedFetcher::serving_images());
        let pipeline = ArtworkPipeline::new(&AppConfig::default(), fetcher.clone(), None);

        pipeline.shutdown();
        let event = pipeline
            .loader()
            .load(&movies(1)[0], PresentationContext::Poster)
            .await;

        assert!(event.is_none());
        assert!(fetcher.calls().is_empty());
    }
}
