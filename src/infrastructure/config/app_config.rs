//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::application::services::{ImageSizing, RetryPolicy, candidate_resolver, pagination};
use crate::infrastructure::image::{CacheConfig, FetchPoolConfig, PrefetchConfig};
use crate::infrastructure::image::{fetch_pool, memory_cache, prefetch};

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Base URL of the media server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Image cache budgets.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Prefetch window and worker pool.
    #[serde(default)]
    pub prefetch: PrefetchSettings,

    /// Fetch concurrency, timeout and retry.
    #[serde(default)]
    pub network: NetworkSettings,

    /// Catalog paging.
    #[serde(default)]
    pub paging: PagingSettings,

    /// Requested image sizes.
    #[serde(default)]
    pub images: ImageSettings,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Decoded byte budget.
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: usize,

    /// Entry-count budget.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_bytes: default_cache_max_bytes(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheSettings {
    /// Cache budgets for [`crate::infrastructure::image::ImageCache`].
    #[must_use]
    pub const fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_bytes: self.max_bytes,
            max_entries: self.max_entries,
        }
    }
}

/// `[prefetch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchSettings {
    /// Items prefetched on each side of the focus.
    #[serde(default = "default_prefetch_distance")]
    pub distance: usize,

    /// Concurrent prefetch jobs.
    #[serde(default = "default_prefetch_workers")]
    pub workers: usize,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            distance: default_prefetch_distance(),
            workers: default_prefetch_workers(),
        }
    }
}

impl PrefetchSettings {
    /// Prefetch window and worker count.
    #[must_use]
    pub const fn to_prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            distance: self.distance,
            workers: self.workers,
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Cap on concurrent network fetches.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt on network errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl NetworkSettings {
    /// Per-fetch timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fetch pool limits.
    #[must_use]
    pub const fn to_fetch_pool_config(&self) -> FetchPoolConfig {
        FetchPoolConfig {
            max_concurrent: self.max_concurrent_fetches,
            timeout: self.timeout(),
        }
    }

    /// Retry policy for on-demand loads.
    #[must_use]
    pub const fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

/// `[paging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingSettings {
    /// Items per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// `[images]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Poster width; height follows 2:3.
    #[serde(default = "default_poster_width")]
    pub poster_width: u32,

    /// Backdrop width; height follows 16:9.
    #[serde(default = "default_backdrop_width")]
    pub backdrop_width: u32,

    /// Thumb width; height follows 16:9.
    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,

    /// Square edge.
    #[serde(default = "default_square_width")]
    pub square_width: u32,

    /// Requested quality, 1-100.
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            poster_width: default_poster_width(),
            backdrop_width: default_backdrop_width(),
            thumb_width: default_thumb_width(),
            square_width: default_square_width(),
            quality: default_quality(),
        }
    }
}

impl ImageSettings {
    /// Sizing passed to the candidate resolver.
    #[must_use]
    pub const fn to_sizing(&self) -> ImageSizing {
        ImageSizing {
            poster_width: self.poster_width,
            backdrop_width: self.backdrop_width,
            thumb_width: self.thumb_width,
            square_width: self.square_width,
            quality: self.quality,
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:8096".to_string()
}

const fn default_cache_max_bytes() -> usize {
    memory_cache::DEFAULT_MAX_BYTES
}

const fn default_cache_max_entries() -> usize {
    memory_cache::DEFAULT_MAX_ENTRIES
}

const fn default_prefetch_distance() -> usize {
    prefetch::DEFAULT_PREFETCH_DISTANCE
}

const fn default_prefetch_workers() -> usize {
    prefetch::DEFAULT_PREFETCH_WORKERS
}

const fn default_max_concurrent_fetches() -> usize {
    fetch_pool::DEFAULT_MAX_CONCURRENT_FETCHES
}

const fn default_timeout_secs() -> u64 {
    fetch_pool::DEFAULT_FETCH_TIMEOUT.as_secs()
}

const fn default_max_retries() -> u32 {
    crate::application::services::error_classifier::DEFAULT_MAX_RETRIES
}

#[allow(clippy::cast_possible_truncation)]
const fn default_retry_backoff_ms() -> u64 {
    crate::application::services::error_classifier::DEFAULT_RETRY_BACKOFF.as_millis() as u64
}

const fn default_page_size() -> usize {
    pagination::DEFAULT_PAGE_SIZE
}

const fn default_poster_width() -> u32 {
    candidate_resolver::DEFAULT_POSTER_WIDTH
}

const fn default_backdrop_width() -> u32 {
    candidate_resolver::DEFAULT_BACKDROP_WIDTH
}

const fn default_thumb_width() -> u32 {
    candidate_resolver::DEFAULT_THUMB_WIDTH
}

const fn default_square_width() -> u32 {
    candidate_resolver::DEFAULT_SQUARE_WIDTH
}

const fn default_quality() -> u8 {
    candidate_resolver::DEFAULT_QUALITY
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(server_url) = &args.server_url {
            self.server_url.clone_from(server_url);
        }
        if let Some(distance) = args.prefetch_distance {
            self.prefetch.distance = distance;
        }
        if let Some(workers) = args.prefetch_workers {
            self.prefetch.workers = workers;
        }
        if let Some(max_concurrent) = args.max_concurrent_fetches {
            self.network.max_concurrent_fetches = max_concurrent;
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.network.timeout_secs = timeout_secs;
        }
        if let Some(page_size) = args.page_size {
            self.paging.page_size = page_size;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            server_url: default_server_url(),
            cache: CacheSettings::default(),
            prefetch: PrefetchSettings::default(),
            network: NetworkSettings::default(),
            paging: PagingSettings::default(),
            images: ImageSettings::default(),
        }
    }
}
