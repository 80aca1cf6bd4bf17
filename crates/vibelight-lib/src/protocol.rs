//! Wire protocol for Govee BLE lights.
//!
//! Commands are fixed 20-byte frames written to a vendor-specific GATT
//! characteristic: opcode bytes, payload, zero padding through byte 18, and
//! a trailing XOR checksum at byte 19. Writes are sent without response.

use uuid::{Uuid, uuid};

use crate::color::Rgb;

/// GATT characteristic all command frames are written to.
pub const COMMAND_CHAR_UUID: Uuid = uuid!("00010203-0405-0607-0809-0a0b0c0d2b11");

/// Every command frame is exactly this long, checksum included.
pub const FRAME_LEN: usize = 20;

/// Color-set opcode; payload is the three channel bytes.
pub const OPCODE_COLOR: [u8; 3] = [0x33, 0x05, 0x02];

/// Status-query (heartbeat) opcode; no payload.
pub const OPCODE_HEARTBEAT: [u8; 2] = [0xAA, 0x01];

/// A complete 20-byte command frame, checksum included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

/// XOR fold of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Zero-pad `head` to 19 bytes and append the checksum.
fn frame(head: &[u8]) -> Frame {
    debug_assert!(head.len() < FRAME_LEN);
    let mut bytes = [0u8; FRAME_LEN];
    bytes[..head.len()].copy_from_slice(head);
    bytes[FRAME_LEN - 1] = checksum(&bytes[..FRAME_LEN - 1]);
    Frame(bytes)
}

/// Encode a color-set command.
pub fn encode_color(color: Rgb) -> Frame {
    frame(&[
        OPCODE_COLOR[0],
        OPCODE_COLOR[1],
        OPCODE_COLOR[2],
        color.r,
        color.g,
        color.b,
    ])
}

/// Encode a status-query (heartbeat) command.
pub fn encode_heartbeat() -> Frame {
    frame(&OPCODE_HEARTBEAT)
}
