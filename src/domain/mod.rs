//! Domain layer with core entities, the fetch error taxonomy and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CandidateList, CatalogItem, ImageRole, ItemKind, PresentationContext};
pub use errors::{ErrorKind, FetchOutcome, RawFetchFailure};
pub use ports::{CatalogPort, FetchedBytes, ImageFetcherPort};
