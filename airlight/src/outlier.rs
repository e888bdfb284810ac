//! Per-pair scoring and outlier rejection.

use rayon::prelude::*;

use crate::pair::{Pair, PairEstimate};

/// A pair together with its computed estimate.
#[derive(Debug, Clone, Copy)]
pub struct ScoredPair<'a> {
    pub pair: Pair<'a>,
    pub estimate: PairEstimate,
}

/// Compute every pair's estimate once.
pub fn score_pairs<'a>(pairs: Vec<Pair<'a>>) -> Vec<ScoredPair<'a>> {
    pairs
        .into_par_iter()
        .map(|pair| ScoredPair {
            estimate: pair.estimate(),
            pair,
        })
        .collect()
}

/// Keep the pairs whose outlier indicator is at most `threshold`.
pub fn remove_outliers<'a>(scored: Vec<ScoredPair<'a>>, threshold: f32) -> Vec<ScoredPair<'a>> {
    let before = scored.len();
    let survivors: Vec<ScoredPair<'a>> = scored
        .into_iter()
        .filter(|s| s.estimate.outlier_indicator <= threshold)
        .collect();

    tracing::info!(
        before,
        after = survivors.len(),
        threshold,
        "Removed outlier pairs"
    );

    survivors
}

/// Unweighted mean airlight over non-degenerate pairs, or `None` if there are none.
pub fn mean_airlight(scored: &[ScoredPair<'_>]) -> Option<[f32; 3]> {
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;
    for s in scored.iter().filter(|s| !s.estimate.is_degenerate()) {
        for (acc, &a) in sum.iter_mut().zip(&s.estimate.airlight) {
            *acc += a as f64;
        }
        count += 1;
    }
    (count > 0).then(|| sum.map(|s| (s / count as f64) as f32))
}
