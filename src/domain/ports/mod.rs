//! Port traits for the network and catalog collaborators.

mod catalog_port;
mod image_fetcher_port;

pub use catalog_port::CatalogPort;
pub use image_fetcher_port::{FetchedBytes, ImageFetcherPort};
