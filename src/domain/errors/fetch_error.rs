//! Fetch failure types.

use thiserror::Error;

use crate::domain::entities::ImagePayload;

/// Closed set of fetch failure categories every call site reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// HTTP 401.
    #[error("unauthorized")]
    Unauthorized,
    /// HTTP 403.
    #[error("access denied")]
    Forbidden,
    /// HTTP 404, or no candidate left to try.
    #[error("image not found")]
    NotFound,
    /// Transport failure or timeout.
    #[error("network error")]
    Network,
    /// Payload fetched but not a decodable image.
    #[error("image could not be decoded")]
    Decode,
    /// The request was abandoned or the pool shut down.
    #[error("request cancelled")]
    Cancelled,
    /// Any other status or failure.
    #[error("unknown fetch error")]
    Unknown,
}

impl ErrorKind {
    /// Returns whether the same URL may be tried again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Unknown)
    }

    /// Returns whether the failure is a credential problem that stops the chain.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Unauthorized | Self::Forbidden)
    }

    /// Returns whether the image is absent or unusable at this URL.
    #[must_use]
    pub const fn is_missing(self) -> bool {
        matches!(self, Self::NotFound | Self::Decode)
    }

    /// Returns whether this kind can reach the renderer as an error state.
    #[must_use]
    pub const fn is_surfaced(self) -> bool {
        matches!(self, Self::Unauthorized | Self::Forbidden | Self::NotFound)
    }
}

/// Raw failure reported by the network collaborator or the decode step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawFetchFailure {
    /// Non-success HTTP status.
    #[error("HTTP status {status}")]
    HttpStatus {
        /// Response status code.
        status: u16,
    },

    /// Connection or protocol failure.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// No response within the fetch timeout.
    #[error("request timed out")]
    Timeout,

    /// Decoding the payload failed.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// The request was abandoned or the pool shut down.
    #[error("request cancelled")]
    Cancelled,

    /// Any other failure.
    #[error("fetch failed: {message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl RawFetchFailure {
    /// Non-success HTTP status.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Transport failure with a message.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Payload that could not be decoded.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Any other failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// HTTP status, if the server answered.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status } => Some(*status),
            _ => None,
        }
    }
}

/// Result of one fetch, after classification.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The image was fetched and decoded.
    Success(ImagePayload),
    /// The fetch failed.
    Failure {
        /// Classified failure.
        kind: ErrorKind,
        /// Raw HTTP status, when there was one.
        status: Option<u16>,
    },
}

impl FetchOutcome {
    /// Returns true for a fetched image.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Classified kind of a failure; `None` on success.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_final_states_are_surfaced() {
        assert!(ErrorKind::Unauthorized.is_surfaced());
        assert!(ErrorKind::Forbidden.is_surfaced());
        assert!(ErrorKind::NotFound.is_surfaced());
        assert!(!ErrorKind::Network.is_surfaced());
        assert!(!ErrorKind::Decode.is_surfaced());
        assert!(!ErrorKind::Cancelled.is_surfaced());
    }

    #[test]
    fn test_http_status_accessor() {
        assert_eq!(RawFetchFailure::status(503).http_status(), Some(503));
        assert_eq!(RawFetchFailure::Timeout.http_status(), None);
        assert_eq!(
            RawFetchFailure::transport("reset").to_string(),
            "transport error: reset"
        );
    }
}
