//! Dominant-color extraction from artwork bitmaps.
//!
//! The artwork is downsampled, sparsely sampled, and each sampled pixel is
//! scored by `3·saturation + value` with penalties for near-black and
//! near-gray — a cheap approximation of perceptual salience that favors
//! vibrant foreground colors over dark or washed-out backgrounds.

use image::RgbImage;
use log::warn;

use crate::color::Rgb;

/// Neither artwork dimension exceeds this before sampling.
const MAX_DIM: u32 = 100;

/// Sample every Nth pixel of the row-major buffer, not every pixel —
/// a deliberate sparse sample trading exactness for speed.
const SAMPLE_STRIDE: usize = 50;

const SAT_WEIGHT: f32 = 3.0;
const NEAR_BLACK_VALUE: f32 = 0.15;
const NEAR_BLACK_PENALTY: f32 = 5.0;
const NEAR_GRAY_SATURATION: f32 = 0.1;
const NEAR_GRAY_PENALTY: f32 = 2.0;

/// Decode artwork bytes and extract the dominant color.
///
/// Never fails: undecodable bytes fall back to white so a bad artwork
/// response can't halt the sync loop.
pub fn color_from_bytes(bytes: &[u8]) -> Rgb {
    match image::load_from_memory(bytes) {
        Ok(img) => dominant_color(&img.to_rgb8()),
        Err(e) => {
            warn!("artwork decode failed: {e}");
            Rgb::WHITE
        }
    }
}

/// Extract the most vibrant color. Pure: identical pixel buffers always
/// yield identical results.
///
/// Returns white when every sampled pixel scores below the starting
/// threshold (e.g. an all-black image, where the value penalty applies to
/// every sample).
pub fn dominant_color(image: &RgbImage) -> Rgb {
    let scaled;
    let image = if image.width() > MAX_DIM || image.height() > MAX_DIM {
        scaled = downsample(image);
        &scaled
    } else {
        image
    };

    let mut best = Rgb::WHITE;
    let mut best_score = -1.0f32;
    for px in image.pixels().step_by(SAMPLE_STRIDE) {
        let (s, v) = saturation_value(px);
        let mut score = SAT_WEIGHT * s + v;
        if v < NEAR_BLACK_VALUE {
            score -= NEAR_BLACK_PENALTY;
        }
        if s < NEAR_GRAY_SATURATION {
            score -= NEAR_GRAY_PENALTY;
        }
        // Strictly greater: ties keep the first maximum seen.
        if score > best_score {
            best_score = score;
            best = Rgb::new(px[0], px[1], px[2]);
        }
    }
    best
}

/// Shrink so neither dimension exceeds `MAX_DIM`, preserving aspect ratio.
fn downsample(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    let nw = (w * MAX_DIM / longest).max(1);
    let nh = (h * MAX_DIM / longest).max(1);
    image::imageops::thumbnail(image, nw, nh)
}

/// HSV saturation and value of a pixel; hue is never needed for scoring.
fn saturation_value(px: &image::Rgb<u8>) -> (f32, f32) {
    let r = f32::from(px[0]) / 255.0;
    let g = f32::from(px[1]) / 255.0;
    let b = f32::from(px[2]) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let s = if max == 0.0 { 0.0 } else { (max - min) / max };
    (s, max)
}
