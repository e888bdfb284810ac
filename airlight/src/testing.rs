//! Testing utilities for airlight.

#![allow(dead_code)]

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::hazy_image::RgbImage;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Diagonal gradient, distinct per channel.
pub fn gradient(width: usize, height: usize) -> RgbImage {
    let denom = (width + height).max(1) as f32;
    let pixels = (0..height)
        .flat_map(|y| {
            (0..width).flat_map(move |x| {
                let v = (x + y) as f32 / denom;
                [v, 0.5 * v + 0.25, 1.0 - v]
            })
        })
        .collect();
    RgbImage::from_raw_parts(width, height, pixels)
}

/// Independent uniform noise in `[0, 1)` for every value.
pub fn noise_texture(width: usize, height: usize, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let pixels = (0..width * height * 3).map(|_| rng.random::<f32>()).collect();
    RgbImage::from_raw_parts(width, height, pixels)
}

/// A periodic texture tile: `period × period` random RGB values around mid grey.
fn texture_tile(period: usize, seed: u64) -> Vec<[f32; 3]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..period * period)
        .map(|_| {
            let base = rng.random_range(0.2f32..0.8);
            [
                base,
                (base + rng.random_range(-0.1f32..0.1)).clamp(0.0, 1.0),
                (base + rng.random_range(-0.1f32..0.1)).clamp(0.0, 1.0),
            ]
        })
        .collect()
}

/// Transmission of row `y`: high near the bottom, low near the top.
pub fn depth_transmission(y: usize, height: usize) -> f32 {
    let depth = 1.0 - y as f32 / height.max(1) as f32;
    0.95 - 0.75 * depth
}

/// Synthetic hazy scene `I = t·J + (1 − t)·A`.
///
/// `J` repeats one random tile of `period` pixels so the same structures
/// appear at many depths; `t` falls off toward the top of the frame.
pub fn hazy_scene(
    width: usize,
    height: usize,
    airlight: [f32; 3],
    period: usize,
    seed: u64,
) -> RgbImage {
    let tile = texture_tile(period, seed);
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let t = depth_transmission(y, height);
        for x in 0..width {
            let j = tile[(y % period) * period + x % period];
            for c in 0..3 {
                pixels.push(t * j[c] + (1.0 - t) * airlight[c]);
            }
        }
    }
    RgbImage::from_raw_parts(width, height, pixels)
}

/// Deterministic 8-periodic texture value at `(x, y)`.
fn periodic_texture(x: usize, y: usize) -> [f32; 3] {
    let (px, py) = (x % 8, y % 8);
    let v = ((px * 5 + py * 3) % 8) as f32 / 8.0;
    let w = ((px * (py + 1)) % 5) as f32 / 5.0;
    [0.2 + 0.6 * v, 0.2 + 0.3 * v + 0.3 * w, 0.8 - 0.6 * w]
}

/// Hazy scene made of horizontal bands of `band` rows, each with a constant
/// transmission taken from `transmissions` (the last value repeats).
///
/// Patches that sit fully inside a band are exact attenuated copies of the
/// same-phase patches in every other band.
pub fn banded_scene(
    width: usize,
    height: usize,
    airlight: [f32; 3],
    band: usize,
    transmissions: &[f32],
) -> RgbImage {
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let t = transmissions[(y / band).min(transmissions.len() - 1)];
        for x in 0..width {
            let j = periodic_texture(x, y);
            for c in 0..3 {
                pixels.push(t * j[c] + (1.0 - t) * airlight[c]);
            }
        }
    }
    RgbImage::from_raw_parts(width, height, pixels)
}
