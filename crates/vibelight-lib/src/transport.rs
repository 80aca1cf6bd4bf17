//! Transport seam — trait over the wireless link, plus a mock for tests.
//!
//! The session talks to the light exclusively through [`LightTransport`] and
//! [`LightLink`]; the btleplug backend lives in [`crate::ble`]. The `alive`
//! flag handed to `connect` is the unexpected-disconnect notification
//! channel: the transport clears it (one-way) when the link drops outside
//! the caller's control flow, and the session observes it on its next
//! operation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;

// ── Error type ──

/// Transport-level errors. All recoverable; the session retries next cycle.
///
/// String payloads follow the convention **"context: details"** where
/// *context* identifies the operation or step (e.g. `"BLE manager"`,
/// `"discover services"`).
#[derive(Debug)]
pub enum TransportError {
    /// Operation requires a connected link.
    NotConnected,
    /// No device with the given address was seen within the scan window.
    DeviceNotFound(String),
    ConnectFailed(String),
    WriteFailed(String),
    DisconnectFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Not connected"),
            TransportError::DeviceNotFound(addr) => {
                write!(f, "Light {addr} not found during scan")
            }
            TransportError::ConnectFailed(e) => write!(f, "Failed to connect: {e}"),
            TransportError::WriteFailed(e) => write!(f, "Write failed: {e}"),
            TransportError::DisconnectFailed(e) => write!(f, "Disconnect failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

// ── Traits ──

/// A connected link to the light, valid until disconnected or dropped.
#[async_trait]
pub trait LightLink: Send + Sync {
    /// Write one frame, fire-and-forget (no acknowledgment wait).
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Close the link. The link must not be used afterwards.
    async fn disconnect(&self) -> Result<()>;
}

impl fmt::Debug for dyn LightLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LightLink")
    }
}

/// Factory for [`LightLink`]s.
#[async_trait]
pub trait LightTransport: Send + Sync {
    /// Connect to the light at `address`.
    ///
    /// `alive` starts true and is cleared by the transport if the link later
    /// drops unexpectedly; it is never set back to true.
    async fn connect(&self, address: &str, alive: Arc<AtomicBool>) -> Result<Box<dyn LightLink>>;
}

// ── Mock transport for testing ──

/// In-memory mock transport for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockState {
        /// Every frame written through any link, in order.
        writes: Mutex<Vec<Vec<u8>>>,
        connect_attempts: AtomicUsize,
        fail_connect: AtomicBool,
        fail_write: AtomicBool,
        kill_on_connect: AtomicBool,
        /// Alive flag of the most recent connect, so tests can drop the link.
        alive: Mutex<Option<Arc<AtomicBool>>>,
    }

    /// Records writes and connect attempts; failures are injectable.
    /// Clones share state, so tests keep one clone for inspection and hand
    /// the other to the session.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<MockState>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.inner.writes.lock().unwrap().clone()
        }

        pub fn write_count(&self) -> usize {
            self.inner.writes.lock().unwrap().len()
        }

        pub fn connect_attempts(&self) -> usize {
            self.inner.connect_attempts.load(Ordering::SeqCst)
        }

        pub fn set_fail_connect(&self, fail: bool) {
            self.inner.fail_connect.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_write(&self, fail: bool) {
            self.inner.fail_write.store(fail, Ordering::SeqCst);
        }

        /// Make the next connect succeed but hand back a link whose alive
        /// flag is already cleared, as when the device drops during setup.
        pub fn set_kill_on_connect(&self, kill: bool) {
            self.inner.kill_on_connect.store(kill, Ordering::SeqCst);
        }

        /// Simulate the link dropping outside the caller's control flow,
        /// as the transport's disconnect notification would.
        pub fn kill_link(&self) {
            if let Some(alive) = self.inner.alive.lock().unwrap().as_ref() {
                alive.store(false, Ordering::SeqCst);
            }
        }
    }

    struct MockLink {
        state: Arc<MockState>,
    }

    #[async_trait]
    impl LightTransport for MockTransport {
        async fn connect(
            &self,
            _address: &str,
            alive: Arc<AtomicBool>,
        ) -> Result<Box<dyn LightLink>> {
            self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_connect.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectFailed(
                    "mock: connect failure injected".into(),
                ));
            }
            if self.inner.kill_on_connect.load(Ordering::SeqCst) {
                alive.store(false, Ordering::SeqCst);
            }
            *self.inner.alive.lock().unwrap() = Some(alive);
            Ok(Box::new(MockLink {
                state: self.inner.clone(),
            }))
        }
    }

    #[async_trait]
    impl LightLink for MockLink {
        async fn write(&self, bytes: &[u8]) -> Result<()> {
            if self.state.fail_write.load(Ordering::SeqCst) {
                return Err(TransportError::WriteFailed(
                    "mock: write failure injected".into(),
                ));
            }
            self.state.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }
}
