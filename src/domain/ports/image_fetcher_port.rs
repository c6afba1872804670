//! Port definition for the network collaborator that fetches image bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::RawFetchFailure;

/// Bytes returned by the server together with the HTTP status.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    /// HTTP status code of the response.
    pub status: u16,
    /// Response body.
    pub bytes: Bytes,
}

impl FetchedBytes {
    /// Wraps a status and body.
    #[must_use]
    pub const fn new(status: u16, bytes: Bytes) -> Self {
        Self { status, bytes }
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Port for fetching raw image bytes.
/// Transport failures are reported as errors; any HTTP answer is `Ok`.
#[async_trait]
pub trait ImageFetcherPort: Send + Sync {
    /// Fetches the body at `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedBytes, RawFetchFailure>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    /// Encodes a blank PNG of the given size.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode png");
        Bytes::from(buf.into_inner())
    }

    /// Fetcher answering from a per-URL script, recording every call.
    pub struct ScriptedFetcher {
        responses: Mutex<HashMap<String, VecDeque<Result<FetchedBytes, RawFetchFailure>>>>,
        fallback: Result<FetchedBytes, RawFetchFailure>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedFetcher {
        /// Creates a fetcher answering 404 to anything unscripted.
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                fallback: Ok(FetchedBytes::new(404, Bytes::new())),
                calls: Mutex::new(Vec::new()),
                delay: None,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        /// Creates a fetcher serving a small PNG for every URL.
        pub fn serving_images() -> Self {
            Self::new().with_fallback(Ok(FetchedBytes::new(200, png_bytes(4, 6))))
        }

        pub fn with_fallback(mut self, result: Result<FetchedBytes, RawFetchFailure>) -> Self {
            self.fallback = result;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Queues a response for `url`. The last queued response repeats.
        pub fn respond(&self, url: &str, result: Result<FetchedBytes, RawFetchFailure>) {
            self.responses
                .lock()
                .entry(url.to_string())
                .or_default()
                .push_back(result);
        }

        pub fn respond_image(&self, url: &str) {
            self.respond(url, Ok(FetchedBytes::new(200, png_bytes(4, 6))));
        }

        pub fn respond_status(&self, url: &str, status: u16) {
            self.respond(url, Ok(FetchedBytes::new(status, Bytes::new())));
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self, url: &str) -> usize {
            self.calls.lock().iter().filter(|u| *u == url).count()
        }

        /// Highest number of fetches observed running at once.
        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcherPort for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedBytes, RawFetchFailure> {
            self.calls.lock().push(url.to_string());
            let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let scripted = self.responses.lock().get_mut(url).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
            scripted.unwrap_or_else(|| self.fallback.clone())
        }
    }
}
