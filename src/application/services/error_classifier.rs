//! Fetch failure classification and retry policy.
//!
//! All call sites map raw failures through [`classify`], so the pipeline only
//! ever branches on [`ErrorKind`].

use std::time::Duration;

use crate::domain::entities::ImagePayload;
use crate::domain::errors::{ErrorKind, FetchOutcome, RawFetchFailure};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default linear backoff step.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Maps a raw failure to its error kind.
#[must_use]
pub const fn classify(failure: &RawFetchFailure) -> ErrorKind {
    match failure {
        RawFetchFailure::HttpStatus { status: 401 } => ErrorKind::Unauthorized,
        RawFetchFailure::HttpStatus { status: 403 } => ErrorKind::Forbidden,
        RawFetchFailure::HttpStatus { status: 404 } => ErrorKind::NotFound,
        RawFetchFailure::Transport { .. } | RawFetchFailure::Timeout => ErrorKind::Network,
        RawFetchFailure::Decode { .. } => ErrorKind::Decode,
        RawFetchFailure::Cancelled => ErrorKind::Cancelled,
        RawFetchFailure::HttpStatus { .. } | RawFetchFailure::Other { .. } => ErrorKind::Unknown,
    }
}

/// Classifies a fetch result into a [`FetchOutcome`].
#[must_use]
pub fn outcome(result: Result<ImagePayload, RawFetchFailure>) -> FetchOutcome {
    match result {
        Ok(payload) => FetchOutcome::Success(payload),
        Err(failure) => FetchOutcome::Failure {
            kind: classify(&failure),
            status: failure.http_status(),
        },
    }
}

/// What the fallback loop does after one attempt.
#[derive(Debug)]
pub enum AttemptResult<T> {
    /// The image is available.
    Success(T),
    /// Transient failure; the same URL may be tried again.
    Retryable(ErrorKind),
    /// The image is missing or unusable here; try the next candidate.
    Advance(ErrorKind),
    /// Credential failure; stop the whole chain.
    Terminal(ErrorKind),
    /// Work was cancelled; stop quietly.
    Cancelled,
}

impl<T> AttemptResult<T> {
    /// Classifies a fetch result.
    #[must_use]
    pub fn from_result(result: Result<T, RawFetchFailure>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::from_kind(classify(&failure)),
        }
    }

    /// Maps an error kind to the action it calls for.
    #[must_use]
    pub const fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound | ErrorKind::Decode => Self::Advance(kind),
            ErrorKind::Network | ErrorKind::Unknown => Self::Retryable(kind),
            ErrorKind::Unauthorized | ErrorKind::Forbidden => Self::Terminal(kind),
            ErrorKind::Cancelled => Self::Cancelled,
        }
    }
}

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Backoff step; retry `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub const fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Returns whether another retry is allowed after `retries_done`.
    #[must_use]
    pub const fn allows_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(retry)
    }
}
