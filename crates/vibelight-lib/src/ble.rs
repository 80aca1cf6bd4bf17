//! btleplug-backed transport.
//!
//! Scans for the configured MAC address, connects, and locates the Govee
//! command characteristic. A background task watches adapter events and
//! clears the session's alive flag when this peripheral disconnects — the
//! only way the session learns of a link drop between operations.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::protocol::COMMAND_CHAR_UUID;
use crate::transport::{LightLink, LightTransport, Result, TransportError};

/// How long to keep scanning for the configured address before giving up.
const SCAN_WINDOW: Duration = Duration::from_secs(10);

/// Pause between scan-result polls.
const SCAN_POLL: Duration = Duration::from_millis(500);

/// BLE central transport. Stateless; each `connect` performs a fresh scan.
#[derive(Default)]
pub struct BleTransport;

impl BleTransport {
    pub fn new() -> Self {
        BleTransport
    }
}

struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
    watcher: JoinHandle<()>,
}

#[async_trait]
impl LightTransport for BleTransport {
    async fn connect(&self, address: &str, alive: Arc<AtomicBool>) -> Result<Box<dyn LightLink>> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("BLE manager: {e}")))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("adapter list: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ConnectFailed("no BLE adapter present".into()))?;

        let peripheral = find_peripheral(&adapter, address).await?;

        // Subscribe before connecting: a disconnect landing while setup is
        // still in progress must reach the watcher, or the session would
        // keep a dead link forever.
        let events = adapter
            .events()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("event stream: {e}")))?;

        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("connect {address}: {e}")))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("discover services: {e}")))?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == COMMAND_CHAR_UUID)
            .ok_or_else(|| {
                TransportError::ConnectFailed(format!(
                    "command characteristic {COMMAND_CHAR_UUID} not found"
                ))
            })?;

        let watcher = spawn_disconnect_watcher(events, peripheral.id(), address, alive);

        Ok(Box::new(BleLink {
            peripheral,
            characteristic,
            watcher,
        }))
    }
}

/// Scan until a peripheral with `address` shows up or the window expires.
async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral> {
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| TransportError::ConnectFailed(format!("start scan: {e}")))?;

    let deadline = tokio::time::Instant::now() + SCAN_WINDOW;
    loop {
        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("peripheral list: {e}")))?;
        for p in peripherals {
            if let Ok(Some(props)) = p.properties().await
                && props.address.to_string().eq_ignore_ascii_case(address)
            {
                let _ = adapter.stop_scan().await;
                return Ok(p);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(SCAN_POLL).await;
    }
    let _ = adapter.stop_scan().await;
    Err(TransportError::DeviceNotFound(address.to_string()))
}

/// Drain an already-open adapter event stream, clearing `alive` when this
/// peripheral disconnects. The stream predates the connect attempt, so no
/// disconnect can slip past unobserved.
fn spawn_disconnect_watcher(
    mut events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    id: PeripheralId,
    address: &str,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let address = address.to_string();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(other) = event
                && other == id
            {
                warn!("light {address} disconnected unexpectedly");
                alive.store(false, Ordering::SeqCst);
                break;
            }
        }
    })
}

#[async_trait]
impl LightLink for BleLink {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, bytes, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::WriteFailed(format!("characteristic write: {e}")))
    }

    async fn disconnect(&self) -> Result<()> {
        self.watcher.abort();
        debug!("closing BLE link");
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::DisconnectFailed(e.to_string()))
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
