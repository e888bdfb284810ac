//! Configuration for the airlight estimation pipeline.
//!
//! [`Config`] is a flat struct; parameters are grouped by comments into the
//! pipeline stages that consume them. It can be built in code or loaded from a
//! YAML/JSON constants file with [`Config::from_file`]. The screaming-case
//! names (`PATCH_SIZE`, `K_NEAREST`, ...) are accepted as aliases.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Enums
// ============================================================================

/// Grid step used when extracting patches.
///
/// The two modes are mutually exclusive: the smoother only understands the
/// sparse grid, so dense extraction skips smoothing entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Every other grid position on both axes (step 2). Default.
    #[default]
    Sparse,
    /// Every grid position (step 1).
    Dense,
}

impl ExtractionMode {
    #[inline]
    pub fn step(self) -> usize {
        match self {
            ExtractionMode::Sparse => 2,
            ExtractionMode::Dense => 1,
        }
    }
}

/// Inclusive range of bucket labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRange {
    pub low: u8,
    pub high: u8,
}

impl BucketRange {
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    #[inline]
    pub fn contains(&self, bucket: u8) -> bool {
        self.low <= bucket && bucket <= self.high
    }

    fn overlaps(&self, other: &BucketRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

// ============================================================================
// Config
// ============================================================================

/// All tunable parameters of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -- Scaling -------------------------------------------------------------
    /// Resize factors, strictly decreasing. The global patch index concatenates
    /// scales in this order.
    pub scales: Vec<f32>,

    // -- Extraction ----------------------------------------------------------
    /// Side length of the square patches, identical across all scales.
    #[serde(alias = "PATCH_SIZE")]
    pub patch_size: usize,
    pub extraction: ExtractionMode,

    // -- Bucketing -----------------------------------------------------------
    #[serde(alias = "NUM_BUCKETS")]
    pub num_buckets: usize,
    /// Flat-region buckets indexed for nearest-neighbour search.
    pub candidate_buckets: BucketRange,
    /// Textured-region buckets used as queries. Must not touch
    /// `candidate_buckets`; the gap between the two is intentional.
    pub query_buckets: BucketRange,

    // -- Pair generation -----------------------------------------------------
    /// Neighbours retrieved per query patch.
    #[serde(alias = "K_NEAREST")]
    pub k_nearest: usize,
    /// Maximum query patches per scale before subsampling kicks in.
    #[serde(alias = "NUM_QUERY_PATCHES")]
    pub num_query_patches: usize,
    /// Seed for query subsampling.
    pub seed: u64,
    /// Drop self-pairs and symmetric duplicates before filtering.
    pub remove_duplicates: bool,

    // -- Filtering -----------------------------------------------------------
    /// Minimum Pearson correlation between normalized patches.
    #[serde(alias = "PAIR_THRESHOLD")]
    pub pair_threshold: f32,
    /// Keep every candidate pair regardless of correlation.
    pub bypass_pair_filter: bool,
    /// Maximum outlier indicator of a surviving pair.
    #[serde(alias = "OUTLIER_THRESHOLD")]
    pub outlier_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 0.75, 0.5, 0.375, 0.3, 0.25],
            patch_size: 7,
            extraction: ExtractionMode::Sparse,
            num_buckets: 10,
            candidate_buckets: BucketRange::new(0, 5),
            query_buckets: BucketRange::new(7, 9),
            k_nearest: 5,
            num_query_patches: 1000,
            seed: 0,
            remove_duplicates: false,
            pair_threshold: 0.8,
            bypass_pair_filter: false,
            outlier_threshold: 0.1,
        }
    }
}

impl Config {
    /// Load a constants file (`.yaml`, `.yml` or `.json`) and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let load_err = |reason: String| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let config: Config = match ext.as_str() {
            "yaml" | "yml" => {
                serde_yml::from_str(&contents).map_err(|e| load_err(e.to_string()))?
            }
            "json" => serde_json::from_str(&contents).map_err(|e| load_err(e.to_string()))?,
            _ => return Err(load_err(format!("unsupported extension '{ext}'"))),
        };

        config.validate()?;
        Ok(config)
    }

    /// Grid step implied by the extraction mode.
    #[inline]
    pub fn step(&self) -> usize {
        self.extraction.step()
    }

    /// Validate configuration parameters.
    ///
    /// Runs before any image work so bad parameters fail fast.
    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 {
            return Err(Error::invalid_config("patch_size", "must be positive, got 0"));
        }
        if self.num_buckets == 0 || self.num_buckets > u8::MAX as usize + 1 {
            return Err(Error::invalid_config(
                "num_buckets",
                format!("must be in [1, 256], got {}", self.num_buckets),
            ));
        }
        if self.k_nearest == 0 {
            return Err(Error::invalid_config("k_nearest", "must be positive, got 0"));
        }
        if self.num_query_patches == 0 {
            return Err(Error::invalid_config(
                "num_query_patches",
                "must be positive, got 0",
            ));
        }

        self.validate_scales()?;
        self.validate_bucket_ranges()?;

        if !self.pair_threshold.is_finite() {
            return Err(Error::invalid_config(
                "pair_threshold",
                format!("must be finite, got {}", self.pair_threshold),
            ));
        }
        if !self.outlier_threshold.is_finite() {
            return Err(Error::invalid_config(
                "outlier_threshold",
                format!("must be finite, got {}", self.outlier_threshold),
            ));
        }
        Ok(())
    }

    fn validate_scales(&self) -> Result<()> {
        if self.scales.is_empty() {
            return Err(Error::invalid_config("scales", "at least one scale is required"));
        }
        for &factor in &self.scales {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(Error::invalid_config(
                    "scales",
                    format!("factors must be positive and finite, got {factor}"),
                ));
            }
        }
        if let Some(w) = self.scales.windows(2).find(|w| w[1] >= w[0]) {
            return Err(Error::invalid_config(
                "scales",
                format!("factors must be strictly decreasing, got {} then {}", w[0], w[1]),
            ));
        }
        Ok(())
    }

    fn validate_bucket_ranges(&self) -> Result<()> {
        let top = self.num_buckets - 1;
        for (name, range) in [
            ("candidate_buckets", &self.candidate_buckets),
            ("query_buckets", &self.query_buckets),
        ] {
            if range.low > range.high {
                return Err(Error::invalid_config(
                    name,
                    format!("empty range [{}, {}]", range.low, range.high),
                ));
            }
            if range.high as usize > top {
                return Err(Error::invalid_config(
                    name,
                    format!("bucket {} exceeds top bucket {top}", range.high),
                ));
            }
        }
        if self.candidate_buckets.overlaps(&self.query_buckets) {
            return Err(Error::invalid_config(
                "query_buckets",
                "candidate and query bucket ranges must not overlap",
            ));
        }
        Ok(())
    }
}
