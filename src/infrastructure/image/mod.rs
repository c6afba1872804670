//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction, render leases and single-flight fills
//! - A bounded fetch pool with timeout and decode
//! - The load orchestrator and background prefetch
//! - The HTTP fetcher adapter

pub mod fetch_pool;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod pipeline;
pub mod prefetch;

pub use fetch_pool::{FetchPool, FetchPoolConfig};
pub use http_fetcher::HttpImageFetcher;
pub use loader::{ImageLoadEvent, ImageLoader, LoadedImage};
pub use memory_cache::{CacheConfig, CacheEntry, CacheLease, CacheStats, ImageCache};
pub use pipeline::ArtworkPipeline;
pub use prefetch::{PrefetchConfig, PrefetchScheduler, PrefetchStats, prefetch_window};
