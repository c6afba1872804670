pub mod candidate_resolver;
pub mod error_classifier;
pub mod pagination;

pub use candidate_resolver::{CandidateResolver, ImageSizing};
pub use error_classifier::{AttemptResult, RetryPolicy, classify, outcome};
pub use pagination::{PageWindow, PaginationState, Paginator};
