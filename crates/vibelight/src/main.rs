//! Vibelight daemon — syncs a Govee BLE light to the Spotify now-playing
//! artwork color until interrupted.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use vibelight_lib::artwork::HttpArtworkFetcher;
use vibelight_lib::ble::BleTransport;
use vibelight_lib::config::Config;
use vibelight_lib::session::LinkSession;
use vibelight_lib::spotify::SpotifyClient;
use vibelight_lib::sync::SyncLoop;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let spotify = SpotifyClient::new(
        &config.spotify_client_id,
        &config.spotify_client_secret,
        &config.spotify_refresh_token,
    );
    let mut session = LinkSession::new(Arc::new(BleTransport::new()), &config.device_mac);

    info!("connecting to light {}", config.device_mac);
    if !session.ensure_connected().await {
        warn!("light not reachable yet, will keep retrying");
    }

    // Ctrl+C flips the flag; the loop notices on its next iteration and
    // disconnects cleanly.
    let running = Arc::new(AtomicBool::new(true));
    let shutdown = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.store(false, Ordering::SeqCst);
        }
    });

    let mut sync = SyncLoop::new(
        Arc::new(spotify),
        Arc::new(HttpArtworkFetcher::new()),
        session,
        config.fade_duration,
    );
    sync.run(running).await;

    info!("goodbye");
    ExitCode::SUCCESS
}
