//! tv-artwork - Artwork pipeline for a media server TV front-end.
//!
//! Resolves which image to request for a catalog item, classifies fetch
//! failures, caches decoded images under byte and entry budgets, prefetches
//! around the focused item and pages large catalogs.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the pure pipeline services.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the cache, fetchers and configuration.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "tv-artwork";
