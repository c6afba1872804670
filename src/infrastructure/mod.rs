//! Infrastructure layer with external service adapters.

/// Catalog adapters.
pub mod catalog;
/// Application configuration.
pub mod config;
/// Image handling (caching, fetching, loading, prefetch).
pub mod image;

pub use catalog::{CatalogError, JsonCatalog};
pub use config::{AppConfig, CliArgs, Command, ConfigError, LogLevel, StorageManager};
pub use image::{
    ArtworkPipeline, CacheLease, CacheStats, HttpImageFetcher, ImageCache, ImageLoadEvent,
    ImageLoader, LoadedImage, PrefetchScheduler, PrefetchStats,
};
