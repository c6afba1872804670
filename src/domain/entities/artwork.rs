//! Artwork candidates and decoded payloads.

use std::str::FromStr;
use std::sync::Arc;

use super::catalog_item::{ImageRole, ItemKind};

/// Card type being rendered; selects the fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentationContext {
    /// Library tiles on the home screen.
    Library,
    /// Episode rows.
    Episode,
    /// Movie and show posters.
    Poster,
    /// Full-width backdrops.
    Backdrop,
    /// Square music cards.
    Square,
}

impl PresentationContext {
    /// Roles to try for this card type, highest priority first.
    #[must_use]
    pub const fn fallback_order(self) -> &'static [ImageRole] {
        match self {
            Self::Library => &[ImageRole::Primary, ImageRole::Backdrop, ImageRole::Poster],
            Self::Episode => &[
                ImageRole::Thumb,
                ImageRole::Backdrop,
                ImageRole::SeriesPoster,
                ImageRole::Poster,
            ],
            Self::Poster => &[ImageRole::Poster, ImageRole::Backdrop],
            Self::Backdrop => &[ImageRole::Backdrop, ImageRole::Poster],
            Self::Square => &[ImageRole::Square, ImageRole::Poster],
        }
    }

    /// The role whose placeholder is shown once every candidate failed.
    #[must_use]
    pub const fn ultimate_fallback(self) -> ImageRole {
        let order = self.fallback_order();
        order[order.len() - 1]
    }

    /// Default card type for an item kind.
    #[must_use]
    pub const fn for_kind(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Library => Self::Library,
            ItemKind::Episode => Self::Episode,
            ItemKind::Album | ItemKind::Artist | ItemKind::Song => Self::Square,
            ItemKind::Movie | ItemKind::Series | ItemKind::Season | ItemKind::Other => {
                Self::Poster
            }
        }
    }
}

impl std::fmt::Display for PresentationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::Episode => write!(f, "episode"),
            Self::Poster => write!(f, "poster"),
            Self::Backdrop => write!(f, "backdrop"),
            Self::Square => write!(f, "square"),
        }
    }
}

impl FromStr for PresentationContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "library" => Ok(Self::Library),
            "episode" => Ok(Self::Episode),
            "poster" => Ok(Self::Poster),
            "backdrop" => Ok(Self::Backdrop),
            "square" => Ok(Self::Square),
            other => Err(format!("unknown presentation context: {other}")),
        }
    }
}

/// A concrete image request: role, URL and target size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    role: ImageRole,
    url: String,
    width: u32,
    height: u32,
    quality: u8,
}

impl ImageDescriptor {
    /// Creates a descriptor for one sized image request.
    #[must_use]
    pub fn new(role: ImageRole, url: impl Into<String>, width: u32, height: u32, quality: u8) -> Self {
        Self {
            role,
            url: url.into(),
            width,
            height,
            quality,
        }
    }

    /// Role this image fills.
    #[must_use]
    pub const fn role(&self) -> ImageRole {
        self.role
    }

    /// The resolved URL; also the cache key.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requested width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Requested height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Requested encoder quality.
    #[must_use]
    pub const fn quality(&self) -> u8 {
        self.quality
    }
}

/// One entry of a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCandidate {
    /// An image the server claims to have.
    Remote(ImageDescriptor),
    /// Terminal "no image" marker carrying the placeholder role.
    Placeholder {
        /// Role whose placeholder art should be shown.
        role: ImageRole,
    },
}

impl ImageCandidate {
    /// Descriptor of a remote candidate; `None` for the placeholder.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&ImageDescriptor> {
        match self {
            Self::Remote(descriptor) => Some(descriptor),
            Self::Placeholder { .. } => None,
        }
    }

    /// Returns true for the terminal placeholder.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

/// Ordered fallback chain for one (item, context) pair.
///
/// Never empty: the last entry is always a [`ImageCandidate::Placeholder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList(Vec<ImageCandidate>);

impl CandidateList {
    /// Builds a chain from real candidates, appending the placeholder.
    #[must_use]
    pub fn new(remote: Vec<ImageDescriptor>, placeholder: ImageRole) -> Self {
        let mut candidates: Vec<ImageCandidate> =
            remote.into_iter().map(ImageCandidate::Remote).collect();
        candidates.push(ImageCandidate::Placeholder { role: placeholder });
        Self(candidates)
    }

    /// First real candidate, used for prefetch.
    #[must_use]
    pub fn primary(&self) -> Option<&ImageDescriptor> {
        self.0.first().and_then(ImageCandidate::descriptor)
    }

    /// Real candidates in priority order.
    pub fn remote(&self) -> impl Iterator<Item = &ImageDescriptor> {
        self.0.iter().filter_map(ImageCandidate::descriptor)
    }

    /// Role of the terminal placeholder.
    #[must_use]
    pub fn placeholder_role(&self) -> Option<ImageRole> {
        match self.0.last() {
            Some(ImageCandidate::Placeholder { role }) => Some(*role),
            _ => None,
        }
    }

    /// Iterates candidates in fallback order.
    pub fn iter(&self) -> std::slice::Iter<'_, ImageCandidate> {
        self.0.iter()
    }

    /// Candidates in fallback order.
    #[must_use]
    pub fn as_slice(&self) -> &[ImageCandidate] {
        &self.0
    }

    /// Number of candidates, placeholder included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a ImageCandidate;
    type IntoIter = std::slice::Iter<'a, ImageCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Decoded image ready for display.
#[derive(Clone)]
pub struct ImagePayload {
    image: Arc<image::DynamicImage>,
    byte_size: usize,
}

impl ImagePayload {
    /// Wraps a decoded image, recording its decoded byte size.
    #[must_use]
    pub fn from_image(image: image::DynamicImage) -> Self {
        let byte_size = image.as_bytes().len();
        Self {
            image: Arc::new(image),
            byte_size,
        }
    }

    /// Decoded image.
    #[must_use]
    pub const fn image(&self) -> &Arc<image::DynamicImage> {
        &self.image
    }

    /// Decoded size, charged against the cache byte budget.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Decoded width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Decoded height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns true if both payloads hold the same pixels.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
            || (self.byte_size == other.byte_size
                && self.width() == other.width()
                && self.image.as_bytes() == other.image.as_bytes())
    }
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("byte_size", &self.byte_size)
            .finish()
    }
}
