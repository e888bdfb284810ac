//! Patch extraction and per-patch statistics.
//!
//! A scale level is cut into overlapping `P×P×3` blocks on a regular grid.
//! Offsets run over `[0, height - P)` × `[0, width - P)` in increments of the
//! step, in row-major order. Downstream stages rebuild the 2D grid from that
//! flat order, so the order and the [`GridShape`] stored in the set's metadata
//! must agree.
//!
//! Patch collections move through the pipeline as [`PatchSet`]s typestated by
//! stage: [`Raw`] after extraction, [`Smoothed`] after the standard deviation
//! grid has been low-pass filtered, [`Bucketed`] once every patch has a texture
//! bucket. Each stage consumes its input and returns a new set.

#[cfg(test)]
mod tests;

use std::marker::PhantomData;

use rayon::prelude::*;

use crate::scale::ScaleLevel;

/// Below this standard deviation a block is treated as flat.
pub const MIN_STD_DEV: f32 = 1e-8;

// ============================================================================
// Stage markers
// ============================================================================

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Raw {}
    impl Sealed for super::Smoothed {}
    impl Sealed for super::Bucketed {}
}

/// Pipeline stage of a [`PatchSet`].
pub trait PatchStage: sealed::Sealed {}

/// Stages whose `std_dev` is final and may be ranked into buckets.
pub trait RankableStage: PatchStage {}

/// Freshly extracted: `std_dev` equals `raw_std_dev`, buckets unset.
#[derive(Debug, Clone, Copy)]
pub struct Raw;
/// `std_dev` replaced by the spatially smoothed value.
#[derive(Debug, Clone, Copy)]
pub struct Smoothed;
/// Every patch carries its final bucket label.
#[derive(Debug, Clone, Copy)]
pub struct Bucketed;

impl PatchStage for Raw {}
impl PatchStage for Smoothed {}
impl PatchStage for Bucketed {}
impl RankableStage for Raw {}
impl RankableStage for Smoothed {}

// ============================================================================
// Patch
// ============================================================================

/// Where a patch was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchPosition {
    pub scale_index: usize,
    /// Top-left row within the scale level.
    pub row: usize,
    /// Top-left column within the scale level.
    pub col: usize,
}

/// A square pixel block and its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Row-major `P×P×3` interleaved RGB values.
    pub(crate) pixels: Vec<f32>,
    pub(crate) mean: [f32; 3],
    /// Ranking statistic. Starts as `raw_std_dev`, replaced once by smoothing.
    pub(crate) std_dev: f32,
    pub(crate) raw_std_dev: f32,
    /// Channel-mean-subtracted pixels divided by `raw_std_dev` (unit RMS); all
    /// zeros for flat blocks.
    pub(crate) normalized: Vec<f32>,
    pub(crate) bucket: u8,
    pub(crate) position: PatchPosition,
}

impl Patch {
    /// Build a patch from interleaved RGB values, computing its statistics.
    ///
    /// The standard deviation is one scalar over all values of the block,
    /// each taken relative to its own channel mean. It scales exactly with
    /// transmission, which pair estimation relies on.
    pub fn from_pixels(pixels: Vec<f32>, position: PatchPosition) -> Self {
        debug_assert!(!pixels.is_empty() && pixels.len() % 3 == 0);

        let n_px = (pixels.len() / 3) as f64;
        let mut channel_sum = [0.0f64; 3];
        for px in pixels.chunks_exact(3) {
            channel_sum[0] += px[0] as f64;
            channel_sum[1] += px[1] as f64;
            channel_sum[2] += px[2] as f64;
        }
        let mean64 = channel_sum.map(|s| s / n_px);

        let sq_sum: f64 = pixels
            .chunks_exact(3)
            .flat_map(|px| {
                (0..3).map(move |c| {
                    let d = px[c] as f64 - mean64[c];
                    d * d
                })
            })
            .sum();
        let std_dev = (sq_sum / pixels.len() as f64).sqrt() as f32;
        let mean = mean64.map(|m| m as f32);

        let normalized = if std_dev < MIN_STD_DEV {
            vec![0.0; pixels.len()]
        } else {
            pixels
                .chunks_exact(3)
                .flat_map(|px| {
                    [
                        (px[0] - mean[0]) / std_dev,
                        (px[1] - mean[1]) / std_dev,
                        (px[2] - mean[2]) / std_dev,
                    ]
                })
                .collect()
        };

        Self {
            pixels,
            mean,
            std_dev,
            raw_std_dev: std_dev,
            normalized,
            bucket: 0,
            position,
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    #[inline]
    pub fn mean(&self) -> [f32; 3] {
        self.mean
    }

    /// Ranking statistic (smoothed when the set went through smoothing).
    #[inline]
    pub fn std_dev(&self) -> f32 {
        self.std_dev
    }

    /// Standard deviation of this block alone, never smoothed.
    #[inline]
    pub fn raw_std_dev(&self) -> f32 {
        self.raw_std_dev
    }

    #[inline]
    pub fn normalized(&self) -> &[f32] {
        &self.normalized
    }

    /// Texture bucket. Only meaningful once the owning set is [`Bucketed`].
    #[inline]
    pub fn bucket(&self) -> u8 {
        self.bucket
    }

    #[inline]
    pub fn position(&self) -> PatchPosition {
        self.position
    }
}

// ============================================================================
// PatchSet
// ============================================================================

/// Rows and columns of the extraction grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    /// Number of offsets in `[0, size - patch_size)` stepping by `step`, per axis.
    pub fn for_extraction(width: usize, height: usize, patch_size: usize, step: usize) -> Self {
        let axis = |len: usize| len.saturating_sub(patch_size).div_ceil(step);
        Self {
            rows: axis(height),
            cols: axis(width),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Metadata carried alongside a scale's patches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchSetMeta {
    pub scale_index: usize,
    pub scale_factor: f32,
    pub image_width: usize,
    pub image_height: usize,
    pub patch_size: usize,
    /// Extraction grid step (1 dense, 2 sparse).
    pub step: usize,
    pub grid: GridShape,
}

/// All patches of one scale level, in row-major grid order.
#[derive(Debug, Clone)]
pub struct PatchSet<S: PatchStage> {
    meta: PatchSetMeta,
    patches: Vec<Patch>,
    _stage: PhantomData<S>,
}

impl<S: PatchStage> PatchSet<S> {
    pub(crate) fn from_parts(meta: PatchSetMeta, patches: Vec<Patch>) -> Self {
        Self {
            meta,
            patches,
            _stage: PhantomData,
        }
    }

    /// Re-tag the set for the next stage.
    pub(crate) fn into_stage<T: PatchStage>(self) -> PatchSet<T> {
        PatchSet {
            meta: self.meta,
            patches: self.patches,
            _stage: PhantomData,
        }
    }

    #[inline]
    pub fn meta(&self) -> &PatchSetMeta {
        &self.meta
    }

    #[inline]
    pub fn scale_index(&self) -> usize {
        self.meta.scale_index
    }

    #[inline]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn into_patches(self) -> Vec<Patch> {
        self.patches
    }

    pub(crate) fn patches_mut(&mut self) -> &mut [Patch] {
        &mut self.patches
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Current ranking statistic of every patch, in grid order.
    pub fn std_devs(&self) -> Vec<f32> {
        self.patches.iter().map(|p| p.std_dev).collect()
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Cut one scale level into patches.
///
/// `step` is 1 for dense or 2 for sparse extraction. A level no larger than
/// the patch yields an empty set.
pub fn extract_patches(level: &ScaleLevel, patch_size: usize, step: usize) -> PatchSet<Raw> {
    debug_assert!(patch_size > 0 && step > 0);

    let image = &level.image;
    let grid = GridShape::for_extraction(image.width(), image.height(), patch_size, step);

    let patches: Vec<Patch> = (0..grid.len())
        .into_par_iter()
        .map(|cell| {
            let row = (cell / grid.cols) * step;
            let col = (cell % grid.cols) * step;

            let mut pixels = Vec::with_capacity(patch_size * patch_size * 3);
            for y in row..row + patch_size {
                pixels.extend_from_slice(&image.row(y)[col * 3..(col + patch_size) * 3]);
            }

            Patch::from_pixels(
                pixels,
                PatchPosition {
                    scale_index: level.index,
                    row,
                    col,
                },
            )
        })
        .collect();

    tracing::debug!(
        scale_index = level.index,
        rows = grid.rows,
        cols = grid.cols,
        patches = patches.len(),
        "Extracted patches"
    );

    PatchSet::from_parts(
        PatchSetMeta {
            scale_index: level.index,
            scale_factor: level.factor,
            image_width: image.width(),
            image_height: image.height(),
            patch_size,
            step,
            grid,
        },
        patches,
    )
}
