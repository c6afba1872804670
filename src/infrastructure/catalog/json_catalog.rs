//! Catalog read from a JSON file of already-resolved items.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::entities::CatalogItem;
use crate::domain::ports::CatalogPort;

/// Errors loading a catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a JSON item array.
    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory catalog backed by a JSON array of items.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    items: Vec<CatalogItem>,
    index: HashMap<String, usize>,
}

impl JsonCatalog {
    /// Reads a catalog file.
    ///
    /// # Errors
    /// Returns `CatalogError` if the file cannot be read or is not a JSON item array.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content)?;
        debug!(path = %path.display(), items = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Parses a catalog from JSON text.
    ///
    /// # Errors
    /// Returns `CatalogError::Json` if the text is not a JSON item array.
    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let items: Vec<CatalogItem> = serde_json::from_str(content)?;
        Ok(Self::from_items(items))
    }

    /// Builds a catalog from items. Later duplicates of an id win lookups.
    #[must_use]
    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if index.insert(item.id().to_string(), position).is_some() {
                warn!(item_id = item.id(), "Duplicate catalog id");
            }
        }
        Self { items, index }
    }

    /// Items in file order.
    #[must_use]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Position of `id` in [`Self::items`].
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the catalog has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CatalogPort for JsonCatalog {
    fn item(&self, id: &str) -> Option<CatalogItem> {
        self.position(id).and_then(|i| self.items.get(i)).cloned()
    }
}
