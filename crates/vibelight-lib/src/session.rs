//! Link session — connection state machine and light memory.
//!
//! One `LinkSession` is created at process start and lives until shutdown,
//! cycling `Disconnected → Connecting → Connected` as the link comes and
//! goes. It is the only owner of the transport handle; everything else
//! reaches the light through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};

use crate::color::Rgb;
use crate::protocol::{self, Frame};
use crate::transport::{LightLink, LightTransport, Result, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct LinkSession {
    transport: Arc<dyn LightTransport>,
    address: String,
    state: SessionState,
    /// Valid only while `Connected`.
    link: Option<Box<dyn LightLink>>,
    /// Cleared by the transport when the link drops outside our control
    /// flow. One-way transition, so observing it without a lock is safe.
    alive: Arc<AtomicBool>,
    /// Last color believed sent to the device; fade interpolation origin.
    current_rgb: Rgb,
}

impl LinkSession {
    pub fn new(transport: Arc<dyn LightTransport>, address: impl Into<String>) -> Self {
        LinkSession {
            transport,
            address: address.into(),
            state: SessionState::Disconnected,
            link: None,
            alive: Arc::new(AtomicBool::new(false)),
            current_rgb: Rgb::BLACK,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_rgb(&self) -> Rgb {
        self.current_rgb
    }

    pub fn set_current_rgb(&mut self, color: Rgb) {
        self.current_rgb = color;
    }

    /// Observe the transport's disconnect notification: if the alive flag
    /// was cleared, drop the stale handle and fall back to `Disconnected`.
    fn reap_dead_link(&mut self) {
        if self.state == SessionState::Connected && !self.alive.load(Ordering::SeqCst) {
            debug!("dropping stale link to {}", self.address);
            self.link = None;
            self.state = SessionState::Disconnected;
        }
    }

    /// Make sure the link is up. Returns `false` on failure — never fatal;
    /// callers treat it as "try again next cycle".
    pub async fn ensure_connected(&mut self) -> bool {
        self.reap_dead_link();
        if self.state == SessionState::Connected {
            return true;
        }

        self.state = SessionState::Connecting;
        info!("connecting to {}...", self.address);
        let alive = Arc::new(AtomicBool::new(true));
        match self.transport.connect(&self.address, alive.clone()).await {
            Ok(link) => {
                self.link = Some(link);
                self.alive = alive;
                self.state = SessionState::Connected;
                info!("link to {} established", self.address);
                true
            }
            Err(e) => {
                error!("connect to {} failed: {e}", self.address);
                self.link = None;
                self.state = SessionState::Disconnected;
                false
            }
        }
    }

    /// Send one frame. Requires `Connected`; fails without attempting a
    /// write otherwise. A write error does NOT force `Disconnected` —
    /// only the transport's own disconnect notification drives that.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.reap_dead_link();
        if self.state != SessionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let Some(link) = self.link.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        link.write(frame.as_bytes()).await
    }

    /// Send a status-query frame to keep the link considered alive.
    /// Connects first if needed; failures are logged, never raised.
    pub async fn heartbeat(&mut self) {
        if !self.ensure_connected().await {
            return;
        }
        debug!("sending status query (heartbeat)");
        if let Err(e) = self.send(&protocol::encode_heartbeat()).await {
            warn!("heartbeat failed: {e}");
        }
    }

    /// Close the link if one is open. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.disconnect().await {
                warn!("disconnect from {} failed: {e}", self.address);
            }
        }
        self.state = SessionState::Disconnected;
    }
}
