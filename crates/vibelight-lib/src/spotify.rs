//! Spotify Web API client — refresh-token auth and now-playing polling.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spotify client or API failure.
#[derive(Debug)]
pub enum SpotifyError {
    /// Network-level failure talking to the API.
    Http(String),
    /// Token refresh rejected or no token available.
    Auth(String),
    /// The API answered with an unexpected status or body.
    Api(String),
}

impl fmt::Display for SpotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpotifyError::Http(e) => write!(f, "Spotify request failed: {e}"),
            SpotifyError::Auth(e) => write!(f, "Spotify authentication failed: {e}"),
            SpotifyError::Api(e) => write!(f, "Spotify API error: {e}"),
        }
    }
}

impl std::error::Error for SpotifyError {}

impl From<reqwest::Error> for SpotifyError {
    fn from(e: reqwest::Error) -> Self {
        SpotifyError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SpotifyError>;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const NOW_PLAYING_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";

/// Every request carries this timeout so a hung poll can never stall the
/// control flow indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Renew the access token this far before its stated expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The track Spotify reports as currently playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    /// Stable track identifier, used for change detection.
    pub track_id: String,
    pub title: String,
    pub artist: String,
    /// URL of the largest album artwork, when the track has any.
    pub artwork_url: Option<String>,
}

/// Source of now-playing state. `None` means nothing is playing.
#[async_trait]
pub trait NowPlayingSource: Send + Sync {
    async fn now_playing(&self) -> Result<Option<NowPlaying>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until the token expires.
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Usable now, with more than the renewal margin left.
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    is_playing: bool,
    item: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    id: Option<String>,
    name: String,
    artists: Vec<Artist>,
    album: Album,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    images: Vec<ArtworkImage>,
}

#[derive(Debug, Deserialize)]
struct ArtworkImage {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Client for the subset of the Spotify Web API the sync loop needs.
///
/// Holds a long-lived refresh token and mints short-lived access tokens on
/// demand, renewing a minute before the stated expiry. A `401` from the
/// now-playing endpoint additionally invalidates the cached access token as
/// a backstop, so the next poll re-authenticates.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    access_token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            access_token: Mutex::new(None),
        }
    }

    fn token_request(&self) -> reqwest::RequestBuilder {
        self.http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .timeout(REQUEST_TIMEOUT)
    }

    fn now_playing_request(&self, token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(NOW_PLAYING_URL)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
    }

    /// Cached access token, minting a fresh one if none is held or the held
    /// one is within [`TOKEN_EXPIRY_MARGIN`] of its expiry.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.access_token.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.is_fresh()
        {
            return Ok(cached.token.clone());
        }

        debug!("refreshing Spotify access token");
        let response = self.token_request().send().await?;

        if !response.status().is_success() {
            return Err(SpotifyError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Auth(format!("malformed token response: {e}")))?;
        info!(
            "Spotify access token refreshed, valid for {}s",
            token.expires_in
        );
        *guard = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.access_token.lock().await = None;
    }
}

#[async_trait]
impl NowPlayingSource for SpotifyClient {
    async fn now_playing(&self) -> Result<Option<NowPlaying>> {
        let token = self.access_token().await?;
        let response = self.now_playing_request(&token).send().await?;

        match response.status() {
            // Nothing playing, no active device.
            reqwest::StatusCode::NO_CONTENT => return Ok(None),
            reqwest::StatusCode::UNAUTHORIZED => {
                warn!("Spotify access token expired, will re-authenticate");
                self.invalidate_token().await;
                return Err(SpotifyError::Auth("access token expired".into()));
            }
            status if !status.is_success() => {
                return Err(SpotifyError::Api(format!(
                    "now-playing endpoint returned {status}"
                )));
            }
            _ => {}
        }

        let playing: CurrentlyPlaying = response
            .json()
            .await
            .map_err(|e| SpotifyError::Api(format!("malformed now-playing response: {e}")))?;
        Ok(parse_now_playing(playing))
    }
}

fn parse_now_playing(playing: CurrentlyPlaying) -> Option<NowPlaying> {
    if !playing.is_playing {
        return None;
    }
    let track = playing.item?;
    Some(NowPlaying {
        // Local files have no Spotify id; fall back to the title so change
        // detection still works between distinct tracks.
        track_id: track.id.unwrap_or_else(|| track.name.clone()),
        title: track.name,
        artist: track
            .artists
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_default(),
        artwork_url: largest_image(&track.album.images),
    })
}

/// URL of the image with the largest pixel area, if any.
fn largest_image(images: &[ArtworkImage]) -> Option<String> {
    images
        .iter()
        .max_by_key(|img| {
            u64::from(img.width.unwrap_or(0)) * u64::from(img.height.unwrap_or(0))
        })
        .map(|img| img.url.clone())
}

// ── Test double ──────────────────────────────────────────────────────────

#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    /// Scripted now-playing source. Clones share the script, so tests keep
    /// one clone to re-script mid-run.
    #[derive(Clone, Default)]
    pub struct MockNowPlaying {
        inner: Arc<StdMutex<MockState>>,
    }

    #[derive(Default)]
    struct MockState {
        current: Option<NowPlaying>,
        fail: bool,
        polls: usize,
    }

    impl MockNowPlaying {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_playing(&self, track: Option<NowPlaying>) {
            self.inner.lock().unwrap().current = track;
        }

        pub fn set_fail(&self, fail: bool) {
            self.inner.lock().unwrap().fail = fail;
        }

        pub fn poll_count(&self) -> usize {
            self.inner.lock().unwrap().polls
        }
    }

    #[async_trait]
    impl NowPlayingSource for MockNowPlaying {
        async fn now_playing(&self) -> Result<Option<NowPlaying>> {
            let mut state = self.inner.lock().unwrap();
            state.polls += 1;
            if state.fail {
                return Err(SpotifyError::Http("mock: poll failure injected".into()));
            }
            Ok(state.current.clone())
        }
    }
}
