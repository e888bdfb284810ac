//! Airlight - global atmospheric light estimation for single hazy images.
//!
//! Small image patches recur at many depths of a natural scene. Two copies of
//! the same structure seen through different amounts of haze are related by
//! `I = t·J + (1 − t)·A`, so every such pair yields an estimate of the global
//! airlight `A`. This library:
//! - Resamples the input at several scales and cuts each into patches
//! - Ranks patches by texture and pairs textured queries with flat candidates
//! - Filters pairs by correlation and by how well they fit the haze model
//! - Aggregates the survivors into one weighted RGB estimate
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use airlight::{AirlightPipeline, Config, RgbImage};
//!
//! let image = RgbImage::from_file("hazy.png")?;
//! let pipeline = AirlightPipeline::new(Config::default())?;
//! let result = pipeline.estimate(&image)?;
//!
//! println!("A = {:?}", result.airlight);
//! ```

pub mod bucket;
pub mod cache;
mod config;
pub mod dedup;
mod error;
pub mod estimate;
pub mod filter;
pub mod grid;
mod hazy_image;
pub mod outlier;
pub mod pair;
pub mod pairing;
pub mod patch;
mod pipeline;
pub mod scale;
pub mod smoothing;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Core types
// ============================================================================

pub use config::{BucketRange, Config, ExtractionMode};
pub use error::{Error, Result};
pub use hazy_image::RgbImage;

// ============================================================================
// Pipeline
// ============================================================================

pub use pipeline::{AirlightPipeline, AirlightResult, Diagnostics};

// ============================================================================
// Stages
// ============================================================================

pub use bucket::{bucket_labels, bucketize};
pub use dedup::{dedup_pairs, remove_duplicates};
pub use estimate::estimate_airlight;
pub use filter::{filter_pairs, pearson_correlation};
pub use outlier::{ScoredPair, mean_airlight, remove_outliers, score_pairs};
pub use pair::{Pair, PairEstimate};
pub use pairing::{
    CandidatePair, PairGeneration, PatchArena, PatchId, generate_pairs, raw_neighbor_pairs,
    raw_neighbor_table,
};
pub use patch::{Bucketed, Patch, PatchPosition, PatchSet, Raw, Smoothed, extract_patches};
pub use scale::{ScaleLevel, build_scales};
pub use smoothing::smooth_patches;

// ============================================================================
// Cache
// ============================================================================

pub use cache::{CacheKey, CacheStore, CachedRun};
