//! End-to-end airlight estimation and its diagnostics.
//!
//! The pipeline runs scale → extract → smooth → bucket per scale, pools all
//! scales into one arena, generates candidate pairs, and then filters, scores
//! and aggregates them. The first half can be served from a [`CacheStore`].

#[cfg(test)]
mod tests;

// =============================================================================
// Imports
// =============================================================================

use serde::Serialize;

use crate::bucket::bucketize;
use crate::cache::{CacheKey, CacheStore, CachedRun};
use crate::config::{Config, ExtractionMode};
use crate::dedup::dedup_pairs;
use crate::error::{Error, Result};
use crate::estimate::estimate_airlight;
use crate::filter::filter_pairs;
use crate::hazy_image::RgbImage;
use crate::outlier::{mean_airlight, remove_outliers, score_pairs};
use crate::pairing::{PairGeneration, PatchArena, generate_pairs};
use crate::patch::{Bucketed, PatchSet, Raw, extract_patches};
use crate::scale::build_scales;
use crate::smoothing::smooth_patches;

/// Result of airlight estimation with diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct AirlightResult {
    /// Estimated global airlight, RGB.
    pub airlight: [f32; 3],
    /// Diagnostic information from the estimation pipeline.
    pub diagnostics: Diagnostics,
}

/// Counts from each pipeline stage, for debugging and tuning.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// Patches extracted per scale, in scale order.
    pub patches_per_scale: Vec<usize>,
    /// Patches pooled as nearest-neighbour candidates.
    pub candidate_patches: usize,
    /// Query patches searched (after per-scale subsampling).
    pub query_patches: usize,
    /// Pairs returned by the nearest-neighbour search.
    pub candidate_pairs: usize,
    /// Pairs left after duplicate removal (equals `candidate_pairs` when disabled).
    pub pairs_after_dedup: usize,
    /// Pairs passing the correlation filter.
    pub pairs_after_filter: usize,
    /// Pairs surviving outlier removal.
    pub pairs_after_outliers: usize,
    /// Unweighted mean airlight of the filtered pairs before outlier removal.
    pub mean_airlight_before_outliers: Option<[f32; 3]>,
    /// Whether patches and pairs were restored from the cache.
    pub cache_hit: bool,
}

// =============================================================================
// AirlightPipeline
// =============================================================================

/// Airlight estimator over one validated [`Config`].
///
/// # Example
///
/// ```rust,ignore
/// use airlight::{AirlightPipeline, Config, RgbImage};
///
/// let image = RgbImage::from_file("hazy.png")?;
/// let pipeline = AirlightPipeline::new(Config::default())?;
/// let result = pipeline.estimate(&image)?;
/// println!("airlight: {:?}", result.airlight);
/// ```
#[derive(Debug, Clone)]
pub struct AirlightPipeline {
    config: Config,
}

impl AirlightPipeline {
    /// Validate `config` and build a pipeline around it.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Estimate the airlight of `image`.
    pub fn estimate(&self, image: &RgbImage) -> Result<AirlightResult> {
        let arena = self.extract(image)?;
        let generation = generate_pairs(&arena, &self.config)?;
        self.finish(&arena, &generation, false)
    }

    /// Like [`estimate`](Self::estimate), restoring patches and candidate
    /// pairs from `cache` when an entry for `key` exists and persisting them
    /// otherwise.
    ///
    /// Cache failures never fail the estimate: an unreadable entry is logged
    /// and recomputed, a failed write is logged.
    pub fn estimate_with_cache(
        &self,
        image: &RgbImage,
        cache: &CacheStore,
        key: &CacheKey,
    ) -> Result<AirlightResult> {
        match cache.load(key) {
            Ok(Some(CachedRun { arena, generation })) => {
                return self.finish(&arena, &generation, true);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read patch cache, recomputing"),
        }

        let arena = self.extract(image)?;
        let generation = generate_pairs(&arena, &self.config)?;
        if let Err(e) = cache.save(key, &arena, &generation) {
            tracing::warn!(error = %e, "Failed to write patch cache");
        }
        self.finish(&arena, &generation, false)
    }

    /// Scale, extract, smooth and bucket every scale.
    pub fn extract(&self, image: &RgbImage) -> Result<PatchArena> {
        let levels = build_scales(image, &self.config.scales);
        let step = self.config.step();

        let mut sets = Vec::with_capacity(levels.len());
        for level in &levels {
            let raw = extract_patches(level, self.config.patch_size, step);
            if raw.is_empty() {
                tracing::warn!(
                    scale_index = level.index,
                    width = level.image.width(),
                    height = level.image.height(),
                    "Scale level is smaller than one patch, skipping"
                );
            }
            sets.push(self.rank(raw)?);
        }

        let arena = PatchArena::new(sets);
        if arena.is_empty() {
            return Err(Error::EmptyResult {
                stage: "patch extraction",
            });
        }

        tracing::info!(
            scales = levels.len(),
            patches = arena.len(),
            "Extracted patches"
        );
        Ok(arena)
    }

    /// Smooth (sparse grids only) and bucket one scale.
    fn rank(&self, raw: PatchSet<Raw>) -> Result<PatchSet<Bucketed>> {
        let num_buckets = self.config.num_buckets;
        Ok(match self.config.extraction {
            ExtractionMode::Sparse => bucketize(smooth_patches(raw)?, num_buckets),
            ExtractionMode::Dense => bucketize(raw, num_buckets),
        })
    }

    /// Dedup, filter, score and aggregate candidate pairs.
    fn finish(
        &self,
        arena: &PatchArena,
        generation: &PairGeneration,
        cache_hit: bool,
    ) -> Result<AirlightResult> {
        let mut diagnostics = Diagnostics {
            patches_per_scale: arena.patches_per_scale(),
            candidate_patches: generation.candidate_count,
            query_patches: generation.query_count,
            candidate_pairs: generation.pairs.len(),
            cache_hit,
            ..Default::default()
        };

        if generation.pairs.is_empty() {
            return Err(Error::EmptyResult {
                stage: "pair generation",
            });
        }

        let deduped;
        let candidates = if self.config.remove_duplicates {
            deduped = dedup_pairs(&generation.pairs);
            &deduped
        } else {
            &generation.pairs
        };
        diagnostics.pairs_after_dedup = candidates.len();

        let pairs = filter_pairs(
            arena,
            candidates,
            self.config.pair_threshold,
            self.config.bypass_pair_filter,
        );
        diagnostics.pairs_after_filter = pairs.len();
        if pairs.is_empty() {
            return Err(Error::EmptyResult {
                stage: "pair filter",
            });
        }

        let scored = score_pairs(pairs);
        diagnostics.mean_airlight_before_outliers = mean_airlight(&scored);
        if let Some(mean) = diagnostics.mean_airlight_before_outliers {
            tracing::debug!(
                r = mean[0],
                g = mean[1],
                b = mean[2],
                "Mean airlight before outlier removal"
            );
        }

        let survivors = remove_outliers(scored, self.config.outlier_threshold);
        diagnostics.pairs_after_outliers = survivors.len();
        if survivors.is_empty() {
            return Err(Error::EmptyResult {
                stage: "outlier removal",
            });
        }

        let airlight = estimate_airlight(survivors.iter().map(|s| &s.estimate))?;

        Ok(AirlightResult {
            airlight,
            diagnostics,
        })
    }
}
