//! Spatial smoothing of the per-patch standard deviation.
//!
//! Sparse extraction lays patches out on a regular grid. Blurring the
//! standard deviation over that grid replaces each patch's ranking statistic
//! with a local texture estimate that is less sensitive to noise.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::patch::{PatchSet, Raw, Smoothed};

/// Gaussian window width over the patch grid.
pub const KERNEL_SIZE: usize = 7;
/// Gaussian sigma over the patch grid, in grid cells.
pub const KERNEL_SIGMA: f32 = 6.0;
/// Extraction step the grid reshape assumes.
pub const SMOOTHING_STEP: usize = 2;

/// Normalized 1D Gaussian of `size` taps centred on the middle tap.
pub fn gaussian_kernel_1d(size: usize, sigma: f32) -> Vec<f32> {
    debug_assert!(size % 2 == 1 && sigma > 0.0);

    let center = (size / 2) as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Mirror an out-of-range index without repeating the edge sample.
///
/// `-1 -> 1`, `len -> len - 2`. Reflects repeatedly for kernels wider than the axis.
#[inline]
fn reflect_101(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * len - 2 - i;
        }
    }
    i as usize
}

/// Separable convolution of `grid` with `kernel` along both axes.
pub fn gaussian_blur(grid: &Grid<f32>, kernel: &[f32]) -> Grid<f32> {
    let (width, height) = (grid.width(), grid.height());
    if grid.is_empty() {
        return grid.clone();
    }
    let radius = (kernel.len() / 2) as isize;

    let mut temp = vec![0.0f32; width * height];
    temp.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, out_row)| {
            let in_row = grid.row(y);
            for (x, out) in out_row.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| {
                        let sx = reflect_101(x as isize + k as isize - radius, width);
                        in_row[sx] * w
                    })
                    .sum();
            }
        });

    let mut output = vec![0.0f32; width * height];
    output
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (x, out) in out_row.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| {
                        let sy = reflect_101(y as isize + k as isize - radius, height);
                        temp[sy * width + x] * w
                    })
                    .sum();
            }
        });

    Grid::new(width, height, output)
}

/// Grid the sparse reshape expects for a scale level: `round((size - P) / 2)` per axis.
fn expected_grid(set: &PatchSet<Raw>) -> (usize, usize) {
    let meta = set.meta();
    let axis = |len: usize| {
        (len.saturating_sub(meta.patch_size) as f32 / SMOOTHING_STEP as f32).round() as usize
    };
    (axis(meta.image_height), axis(meta.image_width))
}

/// Replace every patch's standard deviation with its Gaussian-smoothed value.
///
/// Only valid for sparse extraction. The set's step and patch count are
/// checked against the reshape before anything is touched; `raw_std_dev` is
/// left as is.
pub fn smooth_patches(set: PatchSet<Raw>) -> Result<PatchSet<Smoothed>> {
    let scale_index = set.scale_index();
    let step = set.meta().step;
    if step != SMOOTHING_STEP {
        return Err(Error::DimensionMismatch {
            scale_index,
            what: "extraction step",
            expected: SMOOTHING_STEP,
            actual: step,
        });
    }

    let (rows, cols) = expected_grid(&set);
    if rows * cols != set.len() {
        return Err(Error::DimensionMismatch {
            scale_index,
            what: "smoothing grid",
            expected: rows * cols,
            actual: set.len(),
        });
    }

    if set.is_empty() {
        return Ok(set.into_stage());
    }

    let kernel = gaussian_kernel_1d(KERNEL_SIZE, KERNEL_SIGMA);
    let smoothed = gaussian_blur(&Grid::new(cols, rows, set.std_devs()), &kernel);

    let mut set = set;
    set.patches_mut()
        .par_iter_mut()
        .zip(smoothed.values().par_iter())
        .for_each(|(patch, &value)| patch.std_dev = value);

    tracing::debug!(scale_index, rows, cols, "Smoothed patch standard deviations");

    Ok(set.into_stage())
}
