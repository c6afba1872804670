//! Domain entity definitions.

mod artwork;
mod catalog_item;

pub use artwork::{
    CandidateList, ImageCandidate, ImageDescriptor, ImagePayload, PresentationContext,
};
pub use catalog_item::{CatalogItem, ImageRole, ItemKind};
