//! Multi-scale resampling of the input image.
//!
//! Each scale level is a bicubic (Catmull-Rom) resize of the full-resolution
//! image. Cubic interpolation keeps the downscaled copies free of the blocky
//! aliasing that would otherwise inflate per-patch standard deviations.

use rayon::prelude::*;

use crate::hazy_image::RgbImage;

/// One resized copy of the input image.
#[derive(Debug, Clone)]
pub struct ScaleLevel {
    /// Position in the configured scale list.
    pub index: usize,
    /// Resize factor relative to the input image.
    pub factor: f32,
    pub image: RgbImage,
}

/// Bicubic kernel value (Catmull-Rom spline, a = -0.5).
///
/// W(x) = (a+2)|x|^3 - (a+3)|x|^2 + 1       for |x| <= 1
/// W(x) = a|x|^3 - 5a|x|^2 + 8a|x| - 4a     for 1 < |x| < 2
/// W(x) = 0                                  otherwise
#[inline]
fn bicubic_kernel(x: f32) -> f32 {
    const A: f32 = -0.5;

    let abs_x = x.abs();

    if abs_x <= 1.0 {
        ((A + 2.0) * abs_x - (A + 3.0)) * abs_x * abs_x + 1.0
    } else if abs_x < 2.0 {
        ((A * abs_x - 5.0 * A) * abs_x + 8.0 * A) * abs_x - 4.0 * A
    } else {
        0.0
    }
}

/// Source taps for one output coordinate: four clamped indices and weights.
#[derive(Debug, Clone, Copy)]
struct Taps {
    index: [usize; 4],
    weight: [f32; 4],
}

/// Precompute taps along one axis with pixel-centre alignment.
fn compute_taps(src_len: usize, dst_len: usize, factor: f32) -> Vec<Taps> {
    let last = src_len as i64 - 1;
    (0..dst_len)
        .map(|d| {
            let s = (d as f32 + 0.5) / factor - 0.5;
            let s0 = s.floor();
            let f = s - s0;
            let s0 = s0 as i64;

            let mut index = [0usize; 4];
            let mut weight = [0.0f32; 4];
            for k in 0..4 {
                index[k] = (s0 - 1 + k as i64).clamp(0, last) as usize;
                weight[k] = bicubic_kernel(f - (k as f32 - 1.0));
            }
            Taps { index, weight }
        })
        .collect()
}

/// Output size of a resize by `factor`: rounded, never below one pixel.
#[inline]
pub fn scaled_len(len: usize, factor: f32) -> usize {
    ((len as f32 * factor).round() as usize).max(1)
}

/// Resize `image` by `factor` using bicubic interpolation with replicated borders.
pub fn resize_bicubic(image: &RgbImage, factor: f32) -> RgbImage {
    let (src_w, src_h) = (image.width(), image.height());
    let dst_w = scaled_len(src_w, factor);
    let dst_h = scaled_len(src_h, factor);

    let x_taps = compute_taps(src_w, dst_w, factor);
    let y_taps = compute_taps(src_h, dst_h, factor);

    let mut pixels = vec![0.0f32; dst_w * dst_h * 3];
    pixels
        .par_chunks_mut(dst_w * 3)
        .zip(y_taps.par_iter())
        .for_each(|(out_row, ty)| {
            for (x, tx) in x_taps.iter().enumerate() {
                let mut acc = [0.0f32; 3];
                for (&sy, &wy) in ty.index.iter().zip(ty.weight.iter()) {
                    let src_row = image.row(sy);
                    for (&sx, &wx) in tx.index.iter().zip(tx.weight.iter()) {
                        let w = wx * wy;
                        let p = &src_row[sx * 3..sx * 3 + 3];
                        acc[0] += p[0] * w;
                        acc[1] += p[1] * w;
                        acc[2] += p[2] * w;
                    }
                }
                out_row[x * 3..x * 3 + 3].copy_from_slice(&acc);
            }
        });

    RgbImage::from_raw_parts(dst_w, dst_h, pixels)
}

/// Produce one [`ScaleLevel`] per factor, in the given order.
///
/// Factors are validated by [`crate::Config::validate`]; a factor of exactly
/// 1.0 reproduces the input bit for bit.
pub fn build_scales(image: &RgbImage, factors: &[f32]) -> Vec<ScaleLevel> {
    factors
        .iter()
        .enumerate()
        .map(|(index, &factor)| {
            let scaled = if factor == 1.0 {
                image.clone()
            } else {
                resize_bicubic(image, factor)
            };
            tracing::debug!(
                scale_index = index,
                factor,
                width = scaled.width(),
                height = scaled.height(),
                "Built scale level"
            );
            ScaleLevel {
                index,
                factor,
                image: scaled,
            }
        })
        .collect()
}
