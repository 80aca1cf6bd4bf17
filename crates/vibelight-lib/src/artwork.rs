//! Album artwork download.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

/// Artwork download failure.
#[derive(Debug)]
pub enum ArtworkError {
    /// Network-level failure fetching the image.
    Http(String),
    /// The server answered with a non-success status.
    Status(String),
}

impl fmt::Display for ArtworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtworkError::Http(e) => write!(f, "artwork download failed: {e}"),
            ArtworkError::Status(s) => write!(f, "artwork server returned {s}"),
        }
    }
}

impl std::error::Error for ArtworkError {}

impl From<reqwest::Error> for ArtworkError {
    fn from(e: reqwest::Error) -> Self {
        ArtworkError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArtworkError>;

/// Fetches artwork bytes by URL.
#[async_trait]
pub trait ArtworkFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain HTTP artwork fetcher.
#[derive(Default)]
pub struct HttpArtworkFetcher {
    http: reqwest::Client,
}

impl HttpArtworkFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtworkFetcher for HttpArtworkFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("downloading artwork from {url}");
        let response = self.http.get(url).timeout(FETCH_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(ArtworkError::Status(response.status().to_string()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ── Test double ──────────────────────────────────────────────────────────

#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Serves canned bytes by URL. Clones share state.
    #[derive(Clone, Default)]
    pub struct MockArtworkFetcher {
        inner: Arc<Mutex<MockState>>,
    }

    #[derive(Default)]
    struct MockState {
        responses: HashMap<String, Vec<u8>>,
        fetches: Vec<String>,
    }

    impl MockArtworkFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_response(&self, url: &str, bytes: Vec<u8>) {
            self.inner
                .lock()
                .unwrap()
                .responses
                .insert(url.to_string(), bytes);
        }

        /// URLs fetched so far, in order.
        pub fn fetches(&self) -> Vec<String> {
            self.inner.lock().unwrap().fetches.clone()
        }
    }

    #[async_trait]
    impl ArtworkFetcher for MockArtworkFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            let mut state = self.inner.lock().unwrap();
            state.fetches.push(url.to_string());
            state
                .responses
                .get(url)
                .cloned()
                .ok_or_else(|| ArtworkError::Status(format!("404 Not Found ({url})")))
        }
    }
}
