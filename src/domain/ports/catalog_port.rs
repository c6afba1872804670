//! Port definition for the catalog/data layer.

use crate::domain::entities::CatalogItem;

/// Read access to already-resolved catalog metadata.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogPort: Send + Sync {
    /// Looks up an item by id.
    fn item(&self, id: &str) -> Option<CatalogItem>;
}
