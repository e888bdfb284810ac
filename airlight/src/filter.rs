//! Correlation filter over candidate pairs.

use rayon::prelude::*;

use crate::pair::Pair;
use crate::pairing::{CandidatePair, PatchArena};

/// Pearson correlation of two equally long vectors.
///
/// Returns `None` when either vector has zero variance. Identical vectors
/// give exactly `1.0`.
pub fn pearson_correlation(a: &[f32], b: &[f32]) -> Option<f32> {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return None;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut cross, mut var_a, mut var_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cross += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some((cross / (var_a * var_b).sqrt()).clamp(-1.0, 1.0) as f32)
}

/// Materialize the candidate pairs whose normalized vectors correlate at
/// `threshold` or above. With `bypass` every candidate pair is kept.
///
/// Output order follows the input order.
pub fn filter_pairs<'a>(
    arena: &'a PatchArena,
    candidates: &[CandidatePair],
    threshold: f32,
    bypass: bool,
) -> Vec<Pair<'a>> {
    let pairs: Vec<Pair<'a>> = candidates
        .par_iter()
        .filter_map(|&ids| {
            let query = arena.get(ids.query);
            let candidate = arena.get(ids.candidate);
            let correlation = pearson_correlation(query.normalized(), candidate.normalized());

            let keep = bypass || correlation.is_some_and(|c| c >= threshold);
            keep.then_some(Pair {
                ids,
                query,
                candidate,
                correlation,
            })
        })
        .collect();

    tracing::info!(
        candidates = candidates.len(),
        kept = pairs.len(),
        threshold,
        bypass,
        "Filtered pairs by correlation"
    );

    pairs
}
