//! Catalog adapters.

pub mod json_catalog;

pub use json_catalog::{CatalogError, JsonCatalog};
