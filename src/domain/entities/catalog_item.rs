//! Catalog item entity as delivered by the data layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Content kind of a catalog item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// A top-level library (collection folder).
    Library,
    /// A movie.
    Movie,
    /// A TV series.
    Series,
    /// A season of a series.
    Season,
    /// A single episode.
    Episode,
    /// A music album.
    Album,
    /// A music artist.
    Artist,
    /// A single track.
    Song,
    /// Anything the front-end has no dedicated card for.
    #[default]
    Other,
}

/// Role an image plays for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageRole {
    /// The item's main image.
    Primary,
    /// Wide background art.
    Backdrop,
    /// Portrait cover art.
    Poster,
    /// Wide still, typically an episode frame.
    Thumb,
    /// Square art, typically album covers.
    Square,
    /// Poster of the parent series.
    SeriesPoster,
}

impl ImageRole {
    /// Image type segment used in server image URLs.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Primary | Self::SeriesPoster => "Primary",
            Self::Backdrop => "Backdrop",
            Self::Poster => "Poster",
            Self::Thumb => "Thumb",
            Self::Square => "Square",
        }
    }
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Backdrop => write!(f, "backdrop"),
            Self::Poster => write!(f, "poster"),
            Self::Thumb => write!(f, "thumb"),
            Self::Square => write!(f, "square"),
            Self::SeriesPoster => write!(f, "series-poster"),
        }
    }
}

/// Item metadata relevant to artwork resolution.
///
/// Items are immutable once received; a refresh replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    id: String,
    #[serde(default)]
    kind: ItemKind,
    #[serde(default)]
    name: String,
    #[serde(default)]
    series_id: Option<String>,
    #[serde(default)]
    image_tags: BTreeMap<ImageRole, String>,
}

impl CatalogItem {
    /// Creates an item with no name and no images.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: String::new(),
            series_id: None,
            image_tags: BTreeMap::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the parent series id (episodes and seasons).
    #[must_use]
    pub fn with_series_id(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = Some(series_id.into());
        self
    }

    /// Declares that the server has an image for `role`, identified by `tag`.
    #[must_use]
    pub fn with_image(mut self, role: ImageRole, tag: impl Into<String>) -> Self {
        self.image_tags.insert(role, tag.into());
        self
    }

    /// Server id of the item.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Content kind.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the parent series, for episodes and seasons.
    #[must_use]
    pub fn series_id(&self) -> Option<&str> {
        self.series_id.as_deref()
    }

    /// Returns the image tag for `role`, if the server claims to have one.
    #[must_use]
    pub fn image_tag(&self, role: ImageRole) -> Option<&str> {
        self.image_tags.get(&role).map(String::as_str)
    }

    /// Returns true if the item has a tag for `role`.
    #[must_use]
    pub fn has_image(&self, role: ImageRole) -> bool {
        self.image_tags.contains_key(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_image_tags() {
        let item = CatalogItem::new("ep1", ItemKind::Episode)
            .with_series_id("show1")
            .with_image(ImageRole::Backdrop, "abc");

        assert_eq!(item.image_tag(ImageRole::Backdrop), Some("abc"));
        assert!(!item.has_image(ImageRole::Thumb));
        assert_eq!(item.series_id(), Some("show1"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"id": "42", "image_tags": {"Poster": "p1"}}"#;
        let item: CatalogItem = serde_json::from_str(json).unwrap();

        assert_eq!(item.kind(), ItemKind::Other);
        assert!(item.name().is_empty());
        assert_eq!(item.image_tag(ImageRole::Poster), Some("p1"));
    }
}
