//! Application layer: pure resolution, classification and paging services.

/// Stateless and synchronous services.
pub mod services;

pub use services::{
    AttemptResult, CandidateResolver, ImageSizing, PageWindow, PaginationState, Paginator,
    RetryPolicy, classify,
};
