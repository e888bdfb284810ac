//! A pair of recurring patches and the airlight it implies.
//!
//! Two patches showing the same scene structure at different depths satisfy
//! `I = t·J + (1 − t)·A` with different transmissions. The ratio of their
//! standard deviations gives the relative transmission `r = t_far / t_near`,
//! and the means then pin down `A`:
//!
//! ```text
//! A_c      = (μ_far,c − r·μ_near,c) / (1 − r)
//! weight   = 1 − r
//! outlier  = rms(far − μ_far − r·(near − μ_near)) / (1 − r)
//! ```
//!
//! The outlier indicator is the residual of explaining the far patch as an
//! attenuated near patch, scaled like the airlight so that it reads as an
//! airlight error.

use crate::pairing::CandidatePair;
use crate::patch::{MIN_STD_DEV, Patch};

/// Below this `1 − r` the two patches are at the same depth and carry no
/// airlight information.
pub const MIN_TRANSMISSION_GAP: f32 = 1e-6;

/// Airlight implied by a single pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairEstimate {
    pub airlight: [f32; 3],
    pub weight: f32,
    pub outlier_indicator: f32,
}

impl PairEstimate {
    /// Estimate for a pair that carries no information. Never survives outlier removal.
    pub const DEGENERATE: Self = Self {
        airlight: [0.0; 3],
        weight: 0.0,
        outlier_indicator: f32::INFINITY,
    };

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.weight == 0.0
    }
}

/// Two patches judged to show the same structure.
#[derive(Debug, Clone, Copy)]
pub struct Pair<'a> {
    pub ids: CandidatePair,
    pub query: &'a Patch,
    pub candidate: &'a Patch,
    /// Pearson correlation of the normalized vectors; `None` when either is flat.
    pub correlation: Option<f32>,
}

impl<'a> Pair<'a> {
    /// The patch with the larger raw standard deviation (the less hazy one) first.
    pub fn near_far(&self) -> (&'a Patch, &'a Patch) {
        if self.query.raw_std_dev() >= self.candidate.raw_std_dev() {
            (self.query, self.candidate)
        } else {
            (self.candidate, self.query)
        }
    }

    /// Compute this pair's airlight, weight and outlier indicator.
    pub fn estimate(&self) -> PairEstimate {
        let (near, far) = self.near_far();
        let sigma_near = near.raw_std_dev();
        if sigma_near < MIN_STD_DEV {
            return PairEstimate::DEGENERATE;
        }

        let r = far.raw_std_dev() / sigma_near;
        let gap = 1.0 - r;
        if gap < MIN_TRANSMISSION_GAP {
            return PairEstimate::DEGENERATE;
        }

        let (mu_near, mu_far) = (near.mean(), far.mean());
        let airlight: [f32; 3] = std::array::from_fn(|c| (mu_far[c] - r * mu_near[c]) / gap);

        let residual_sq: f64 = near
            .pixels()
            .chunks_exact(3)
            .zip(far.pixels().chunks_exact(3))
            .flat_map(|(n, f)| {
                (0..3).map(move |c| {
                    let d = (f[c] - mu_far[c]) - r * (n[c] - mu_near[c]);
                    (d as f64) * (d as f64)
                })
            })
            .sum();
        let rms = (residual_sq / near.pixels().len() as f64).sqrt() as f32;

        PairEstimate {
            airlight,
            weight: gap,
            outlier_indicator: rms / gap,
        }
    }
}
