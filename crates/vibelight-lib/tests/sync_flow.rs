//! Integration tests: end-to-end sync flows through the public API using
//! the mock transport, now-playing source and artwork fetcher.
//!
//! These exercise the full poll → fetch → extract → fade → frame pipeline,
//! verifying wire bytes, link lifecycle transitions and heartbeat cadence.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::{ImageFormat, RgbImage};
use vibelight_lib::artwork::mock::MockArtworkFetcher;
use vibelight_lib::color::Rgb;
use vibelight_lib::protocol;
use vibelight_lib::session::{LinkSession, SessionState};
use vibelight_lib::spotify::NowPlaying;
use vibelight_lib::spotify::mock::MockNowPlaying;
use vibelight_lib::sync::SyncLoop;
use vibelight_lib::transport::mock::MockTransport;

const FADE: Duration = Duration::from_secs(1);

/// Helper: PNG bytes of a solid-color 32x32 image.
fn solid_png(color: Rgb) -> Vec<u8> {
    let img = RgbImage::from_pixel(32, 32, image::Rgb([color.r, color.g, color.b]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn track(id: &str, url: &str) -> NowPlaying {
    NowPlaying {
        track_id: id.to_string(),
        title: format!("Song {id}"),
        artist: "Band".to_string(),
        artwork_url: Some(url.to_string()),
    }
}

struct Rig {
    spotify: MockNowPlaying,
    fetcher: MockArtworkFetcher,
    transport: MockTransport,
    sync: SyncLoop,
}

fn rig() -> Rig {
    let spotify = MockNowPlaying::new();
    let fetcher = MockArtworkFetcher::new();
    let transport = MockTransport::new();
    let session = LinkSession::new(Arc::new(transport.clone()), "A4:C1:38:01:02:03");
    let sync = SyncLoop::new(
        Arc::new(spotify.clone()),
        Arc::new(fetcher.clone()),
        session,
        FADE,
    );
    Rig {
        spotify,
        fetcher,
        transport,
        sync,
    }
}

// ── Test: full track-change pipeline down to the wire bytes ──

#[tokio::test(start_paused = true)]
async fn track_change_reaches_wire_as_checksummed_frames() {
    let mut rig = rig();
    let red = Rgb::new(255, 0, 0);
    rig.spotify.set_playing(Some(track("t1", "https://img/red")));
    rig.fetcher.set_response("https://img/red", solid_png(red));

    rig.sync.run_once().await.unwrap();

    let writes = rig.transport.writes();
    assert_eq!(writes.len(), 8, "one frame per fade step");
    for frame in &writes {
        assert_eq!(frame.len(), 20);
        assert_eq!(&frame[..3], &[0x33, 0x05, 0x02], "color opcode");
        let checksum = frame[..19].iter().fold(0u8, |acc, b| acc ^ b);
        assert_eq!(frame[19], checksum, "XOR checksum over bytes 0..19");
    }
    assert_eq!(&writes[7][3..6], &[255, 0, 0], "final step lands on target");
    assert_eq!(rig.sync.session().state(), SessionState::Connected);
}

// ── Test: successive track changes fade from the previous color ──

#[tokio::test(start_paused = true)]
async fn second_track_fades_from_first_color() {
    let mut rig = rig();
    rig.spotify.set_playing(Some(track("t1", "https://img/red")));
    rig.fetcher
        .set_response("https://img/red", solid_png(Rgb::new(255, 0, 0)));
    rig.sync.run_once().await.unwrap();

    rig.spotify.set_playing(Some(track("t2", "https://img/blue")));
    rig.fetcher
        .set_response("https://img/blue", solid_png(Rgb::new(0, 0, 255)));
    rig.sync.run_once().await.unwrap();

    let writes = rig.transport.writes();
    assert_eq!(writes.len(), 16);
    // First frame of the second fade interpolates off red, not black.
    let first = &writes[8];
    assert_eq!(&first[3..6], &[223, 0, 31], "red -> blue at step 1/8");
    assert_eq!(&writes[15][3..6], &[0, 0, 255]);
}

// ── Test: link death mid-run heals on the following iteration ──

#[tokio::test(start_paused = true)]
async fn link_death_heals_on_next_track_change() {
    let mut rig = rig();
    rig.spotify.set_playing(Some(track("t1", "https://img/a")));
    rig.fetcher
        .set_response("https://img/a", solid_png(Rgb::new(0, 255, 0)));
    rig.sync.run_once().await.unwrap();
    assert_eq!(rig.transport.connect_attempts(), 1);

    // The light powers off: transport clears the alive flag.
    rig.transport.kill_link();

    rig.spotify.set_playing(Some(track("t2", "https://img/b")));
    rig.fetcher
        .set_response("https://img/b", solid_png(Rgb::new(0, 0, 255)));
    rig.sync.run_once().await.unwrap();

    assert_eq!(rig.transport.connect_attempts(), 2, "reconnected");
    assert_eq!(rig.sync.session().state(), SessionState::Connected);
    let writes = rig.transport.writes();
    assert_eq!(&writes.last().unwrap()[3..6], &[0, 0, 255]);
}

// ── Test: source errors never kill the loop ──

#[tokio::test(start_paused = true)]
async fn loop_survives_poll_errors_and_recovers() {
    let mut rig = rig();
    rig.spotify.set_fail(true);

    let running = Arc::new(AtomicBool::new(true));
    let stopper = running.clone();
    let spotify = rig.spotify.clone();
    let fetcher = rig.fetcher.clone();
    tokio::spawn(async move {
        // Two failing iterations at the 5s backoff, then recovery.
        tokio::time::sleep(Duration::from_secs(11)).await;
        spotify.set_fail(false);
        spotify.set_playing(Some(track("t1", "https://img/a")));
        fetcher.set_response("https://img/a", solid_png(Rgb::new(9, 9, 9)));
        tokio::time::sleep(Duration::from_secs(8)).await;
        stopper.store(false, Ordering::SeqCst);
    });

    rig.sync.run(running).await;

    assert!(rig.spotify.poll_count() >= 3);
    assert_eq!(
        rig.sync.last_artwork_url(),
        Some("https://img/a"),
        "loop recovered and processed the track after the failures"
    );
    assert_eq!(
        rig.sync.session().state(),
        SessionState::Disconnected,
        "orderly disconnect on shutdown"
    );
}

// ── Test: idle loop heartbeats to keep the link alive ──

#[tokio::test(start_paused = true)]
async fn idle_loop_sends_heartbeats_only() {
    let mut rig = rig();
    let running = Arc::new(AtomicBool::new(true));
    let stopper = running.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(13)).await;
        stopper.store(false, Ordering::SeqCst);
    });

    rig.sync.run(running).await;

    let heartbeat = protocol::encode_heartbeat().as_bytes().to_vec();
    let writes = rig.transport.writes();
    assert!(!writes.is_empty());
    assert!(
        writes.iter().all(|w| *w == heartbeat),
        "idle loop writes nothing but keep-alive frames"
    );
}
