//! Vibelight — mirrors the currently-playing track's artwork color onto a
//! Govee BLE light.

pub mod artwork;
pub mod ble;
pub mod color;
pub mod config;
pub mod error;
pub mod extract;
pub mod fade;
pub mod protocol;
pub mod session;
pub mod spotify;
pub mod sync;
pub mod transport;

pub use error::VibelightError;
