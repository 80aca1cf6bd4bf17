//! The sync loop — now-playing polling, artwork-to-color, fades, heartbeats.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info};
use tokio::time::Instant;

use crate::artwork::ArtworkFetcher;
use crate::error::Result;
use crate::session::LinkSession;
use crate::spotify::NowPlayingSource;
use crate::{extract, fade};

/// How often the now-playing source is polled.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum quiet time on the link before a keep-alive frame goes out.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Pause after a failed iteration before polling again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Drives the light from the now-playing source until told to stop.
///
/// Track changes are detected by artwork URL, not track id: a re-released
/// single with identical artwork triggers no fade, which is the desired
/// behavior since the color would not change either.
pub struct SyncLoop {
    source: Arc<dyn NowPlayingSource>,
    fetcher: Arc<dyn ArtworkFetcher>,
    session: LinkSession,
    fade_duration: Duration,
    last_artwork_url: Option<String>,
    last_heartbeat: Instant,
}

impl SyncLoop {
    pub fn new(
        source: Arc<dyn NowPlayingSource>,
        fetcher: Arc<dyn ArtworkFetcher>,
        session: LinkSession,
        fade_duration: Duration,
    ) -> Self {
        Self {
            source,
            fetcher,
            session,
            fade_duration,
            last_artwork_url: None,
            last_heartbeat: Instant::now(),
        }
    }

    pub fn session(&self) -> &LinkSession {
        &self.session
    }

    pub fn last_artwork_url(&self) -> Option<&str> {
        self.last_artwork_url.as_deref()
    }

    /// One poll-and-react iteration, without the heartbeat or the sleep.
    ///
    /// Errors from the now-playing source or the artwork fetch propagate so
    /// [`run`](Self::run) can back off; a failed fetch leaves
    /// `last_artwork_url` untouched and is retried on the next iteration.
    pub async fn run_once(&mut self) -> Result<()> {
        let Some(track) = self.source.now_playing().await? else {
            debug!("nothing playing");
            return Ok(());
        };

        let Some(url) = track.artwork_url else {
            debug!("'{}' has no artwork, keeping current color", track.title);
            return Ok(());
        };

        if self.last_artwork_url.as_deref() == Some(url.as_str()) {
            return Ok(());
        }

        info!("new song: {} - {}", track.artist, track.title);
        let bytes = self.fetcher.fetch(&url).await?;
        let color = extract::color_from_bytes(&bytes);
        info!("dominant artwork color: {color}");
        fade::fade_to(&mut self.session, color, self.fade_duration).await;
        self.last_artwork_url = Some(url);
        Ok(())
    }

    /// Send a keep-alive if the interval has elapsed, resetting the timer
    /// regardless of whether the frame made it out.
    async fn maybe_heartbeat(&mut self) {
        if self.last_heartbeat.elapsed() > HEARTBEAT_INTERVAL {
            self.session.heartbeat().await;
            self.last_heartbeat = Instant::now();
        }
    }

    /// Poll until `running` is cleared, then disconnect in an orderly way.
    ///
    /// Every iteration failure is contained here: logged, followed by the
    /// error backoff instead of the regular poll delay. Only the shutdown
    /// flag ends the loop.
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        info!("sync loop started");
        while running.load(Ordering::SeqCst) {
            match self.run_once().await {
                Ok(()) => {
                    self.maybe_heartbeat().await;
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    error!("sync iteration failed: {e}");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
        info!("sync loop stopping");
        self.session.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::mock::MockArtworkFetcher;
    use crate::color::Rgb;
    use crate::protocol;
    use crate::session::SessionState;
    use crate::spotify::NowPlaying;
    use crate::spotify::mock::MockNowPlaying;
    use crate::transport::mock::MockTransport;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    const FADE: Duration = Duration::from_secs(1);

    fn png_bytes(color: Rgb) -> Vec<u8> {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([color.r, color.g, color.b]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn track(id: &str, artwork_url: Option<&str>) -> NowPlaying {
        NowPlaying {
            track_id: id.to_string(),
            title: format!("Song {id}"),
            artist: "Band".to_string(),
            artwork_url: artwork_url.map(str::to_string),
        }
    }

    struct Fixture {
        spotify: MockNowPlaying,
        fetcher: MockArtworkFetcher,
        transport: MockTransport,
        sync: SyncLoop,
    }

    fn fixture() -> Fixture {
        let spotify = MockNowPlaying::new();
        let fetcher = MockArtworkFetcher::new();
        let transport = MockTransport::new();
        let session = LinkSession::new(Arc::new(transport.clone()), "AA:BB:CC:DD:EE:FF");
        let sync = SyncLoop::new(
            Arc::new(spotify.clone()),
            Arc::new(fetcher.clone()),
            session,
            FADE,
        );
        Fixture {
            spotify,
            fetcher,
            transport,
            sync,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_track_fades_to_artwork_color() {
        let mut fx = fixture();
        let red = Rgb::new(255, 0, 0);
        fx.spotify.set_playing(Some(track("t1", Some("https://img/red"))));
        fx.fetcher.set_response("https://img/red", png_bytes(red));

        fx.sync.run_once().await.unwrap();

        let writes = fx.transport.writes();
        assert_eq!(writes.len(), 8);
        assert_eq!(
            writes[7],
            protocol::encode_color(red).as_bytes().to_vec()
        );
        assert_eq!(fx.sync.last_artwork_url(), Some("https://img/red"));
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_artwork_does_not_refade() {
        let mut fx = fixture();
        fx.spotify.set_playing(Some(track("t1", Some("https://img/a"))));
        fx.fetcher.set_response("https://img/a", png_bytes(Rgb::new(0, 255, 0)));

        fx.sync.run_once().await.unwrap();
        fx.sync.run_once().await.unwrap();

        assert_eq!(fx.fetcher.fetches().len(), 1);
        assert_eq!(fx.transport.write_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn track_change_with_new_artwork_fades_again() {
        let mut fx = fixture();
        fx.spotify.set_playing(Some(track("t1", Some("https://img/a"))));
        fx.fetcher.set_response("https://img/a", png_bytes(Rgb::new(0, 255, 0)));
        fx.sync.run_once().await.unwrap();

        fx.spotify.set_playing(Some(track("t2", Some("https://img/b"))));
        fx.fetcher.set_response("https://img/b", png_bytes(Rgb::new(0, 0, 255)));
        fx.sync.run_once().await.unwrap();

        assert_eq!(fx.fetcher.fetches().len(), 2);
        assert_eq!(fx.transport.write_count(), 16);
        assert_eq!(fx.sync.last_artwork_url(), Some("https://img/b"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_player_writes_nothing() {
        let mut fx = fixture();

        fx.sync.run_once().await.unwrap();

        assert_eq!(fx.transport.write_count(), 0);
        assert_eq!(fx.spotify.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn artwork_less_track_keeps_current_color() {
        let mut fx = fixture();
        fx.spotify.set_playing(Some(track("local", None)));

        fx.sync.run_once().await.unwrap();

        assert_eq!(fx.transport.write_count(), 0);
        assert_eq!(fx.sync.last_artwork_url(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_propagates() {
        let mut fx = fixture();
        fx.spotify.set_fail(true);

        assert!(fx.sync.run_once().await.is_err());
        assert_eq!(fx.transport.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_retried_next_iteration() {
        let mut fx = fixture();
        fx.spotify.set_playing(Some(track("t1", Some("https://img/slow"))));

        assert!(fx.sync.run_once().await.is_err());
        assert_eq!(fx.sync.last_artwork_url(), None, "failed fetch not recorded");

        fx.fetcher.set_response("https://img/slow", png_bytes(Rgb::new(9, 9, 9)));
        fx.sync.run_once().await.unwrap();

        assert_eq!(fx.fetcher.fetches().len(), 2);
        assert_eq!(fx.sync.last_artwork_url(), Some("https://img/slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_artwork_fades_to_white() {
        let mut fx = fixture();
        fx.spotify.set_playing(Some(track("t1", Some("https://img/bad"))));
        fx.fetcher.set_response("https://img/bad", vec![0xde, 0xad, 0xbe, 0xef]);

        fx.sync.run_once().await.unwrap();

        let writes = fx.transport.writes();
        assert_eq!(
            writes.last().unwrap(),
            &protocol::encode_color(Rgb::WHITE).as_bytes().to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_heartbeats_while_idle_and_disconnects_on_shutdown() {
        let mut fx = fixture();
        let running = Arc::new(AtomicBool::new(true));
        let stopper = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(9)).await;
            stopper.store(false, Ordering::SeqCst);
        });

        fx.sync.run(running).await;

        let heartbeat = protocol::encode_heartbeat().as_bytes().to_vec();
        let beats = fx
            .transport
            .writes()
            .iter()
            .filter(|w| **w == heartbeat)
            .count();
        assert!(beats >= 1, "idle loop keeps the link alive");
        assert!(fx.transport.connect_attempts() >= 1);
        assert_eq!(fx.sync.session().state(), SessionState::Disconnected);
    }
}
