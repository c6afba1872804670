//! Media server image fetcher over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::domain::errors::RawFetchFailure;
use crate::domain::ports::{FetchedBytes, ImageFetcherPort};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// `reqwest`-backed implementation of [`ImageFetcherPort`].
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration) -> Result<Self, RawFetchFailure> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RawFetchFailure::other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn map_request_error(error: &reqwest::Error) -> RawFetchFailure {
    if error.is_timeout() {
        RawFetchFailure::Timeout
    } else if error.is_builder() {
        RawFetchFailure::other(error.to_string())
    } else {
        RawFetchFailure::transport(error.to_string())
    }
}

#[async_trait]
impl ImageFetcherPort for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBytes, RawFetchFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "Image request failed");
            map_request_error(&e)
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            warn!(url, error = %e, "Failed to read image body");
            map_request_error(&e)
        })?;

        Ok(FetchedBytes::new(status, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5));
        assert!(fetcher.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_url_is_not_a_transport_error() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();

        let failure = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(failure, RawFetchFailure::Other { .. }));
    }
}
