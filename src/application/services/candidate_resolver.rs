//! Maps (item, card type) to an ordered list of image candidates.
//!
//! The resolver owns aspect-ratio policy: every descriptor carries the target
//! size for its role, so renderers never guess dimensions.

use crate::domain::entities::{
    CandidateList, CatalogItem, ImageDescriptor, ImageRole, PresentationContext,
};

/// Default poster width; posters are 2:3.
pub const DEFAULT_POSTER_WIDTH: u32 = 400;
/// Default backdrop width; backdrops are 16:9.
pub const DEFAULT_BACKDROP_WIDTH: u32 = 1280;
/// Default thumb width; thumbs are 16:9.
pub const DEFAULT_THUMB_WIDTH: u32 = 640;
/// Default square width.
pub const DEFAULT_SQUARE_WIDTH: u32 = 500;
/// Default encoder quality requested from the server.
pub const DEFAULT_QUALITY: u8 = 90;
/// Largest edge ever requested; larger configured widths are clamped.
pub const MAX_IMAGE_EDGE: u32 = 8192;

/// Target sizes per image role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSizing {
    /// Width of portrait art (primary, poster, series poster).
    pub poster_width: u32,
    /// Width of backdrops.
    pub backdrop_width: u32,
    /// Width of thumbs.
    pub thumb_width: u32,
    /// Edge of square art.
    pub square_width: u32,
    /// Requested quality, 1-100.
    pub quality: u8,
}

impl Default for ImageSizing {
    fn default() -> Self {
        Self {
            poster_width: DEFAULT_POSTER_WIDTH,
            backdrop_width: DEFAULT_BACKDROP_WIDTH,
            thumb_width: DEFAULT_THUMB_WIDTH,
            square_width: DEFAULT_SQUARE_WIDTH,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ImageSizing {
    /// Copy with every width in `1..=MAX_IMAGE_EDGE` and quality in `1..=100`.
    #[must_use]
    pub const fn normalized(self) -> Self {
        Self {
            poster_width: clamp_edge(self.poster_width),
            backdrop_width: clamp_edge(self.backdrop_width),
            thumb_width: clamp_edge(self.thumb_width),
            square_width: clamp_edge(self.square_width),
            quality: match self.quality {
                0 => 1,
                q if q > 100 => 100,
                q => q,
            },
        }
    }

    /// Target `(width, height)` for a role. Widths are clamped to `MAX_IMAGE_EDGE`.
    #[must_use]
    pub const fn dimensions(&self, role: ImageRole) -> (u32, u32) {
        match role {
            ImageRole::Primary | ImageRole::Poster | ImageRole::SeriesPoster => {
                let width = clamp_edge(self.poster_width);
                (width, width * 3 / 2)
            }
            ImageRole::Backdrop => {
                let width = clamp_edge(self.backdrop_width);
                (width, width * 9 / 16)
            }
            ImageRole::Thumb => {
                let width = clamp_edge(self.thumb_width);
                (width, width * 9 / 16)
            }
            ImageRole::Square => {
                let width = clamp_edge(self.square_width);
                (width, width)
            }
        }
    }
}

const fn clamp_edge(width: u32) -> u32 {
    match width {
        0 => 1,
        w if w > MAX_IMAGE_EDGE => MAX_IMAGE_EDGE,
        w => w,
    }
}

/// Builds candidate lists against one media server.
#[derive(Debug, Clone)]
pub struct CandidateResolver {
    server_url: String,
    sizing: ImageSizing,
}

impl CandidateResolver {
    /// Creates a resolver for `server_url`. Out-of-range sizing is clamped.
    #[must_use]
    pub fn new(server_url: impl Into<String>, sizing: ImageSizing) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            server_url,
            sizing: sizing.normalized(),
        }
    }

    /// Sizing applied to every descriptor.
    #[must_use]
    pub const fn sizing(&self) -> &ImageSizing {
        &self.sizing
    }

    /// Resolves the fallback chain for `item` rendered as `context`.
    ///
    /// Only roles the item has a tag for become candidates; the list always
    /// ends with the placeholder for the context's last fallback role.
    #[must_use]
    pub fn resolve(&self, item: &CatalogItem, context: PresentationContext) -> CandidateList {
        let remote = context
            .fallback_order()
            .iter()
            .filter_map(|&role| {
                item.image_tag(role)
                    .map(|tag| self.descriptor(item, role, tag))
            })
            .collect();

        CandidateList::new(remote, context.ultimate_fallback())
    }

    /// First real candidate only; used for warm-up and prefetch.
    #[must_use]
    pub fn primary(&self, item: &CatalogItem, context: PresentationContext) -> Option<ImageDescriptor> {
        self.resolve(item, context).primary().cloned()
    }

    fn descriptor(&self, item: &CatalogItem, role: ImageRole, tag: &str) -> ImageDescriptor {
        // Series posters live on the parent series.
        let owner = match role {
            ImageRole::SeriesPoster => item.series_id().unwrap_or(item.id()),
            _ => item.id(),
        };
        let (width, height) = self.sizing.dimensions(role);
        let url = self.image_url(owner, role, tag, width, height);

        ImageDescriptor::new(role, url, width, height, self.sizing.quality)
    }

    /// Builds the server URL for one image. The id and tag are percent-encoded.
    #[must_use]
    pub fn image_url(
        &self,
        owner_id: &str,
        role: ImageRole,
        tag: &str,
        width: u32,
        height: u32,
    ) -> String {
        let params = [
            format!("tag={}", urlencoding::encode(tag)),
            format!("maxWidth={width}"),
            format!("maxHeight={height}"),
            format!("quality={}", self.sizing.quality),
        ];

        format!(
            "{}/Items/{}/Images/{}?{}",
            self.server_url,
            urlencoding::encode(owner_id),
            role.path_segment(),
            params.join("&")
        )
    }
}
