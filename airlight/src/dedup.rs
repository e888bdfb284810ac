//! Removal of self-matches and mirrored duplicates from neighbour results.
//!
//! A k-NN search over one pool returns each patch among its own neighbours,
//! and a mutual match shows up twice as `(i, j)` and `(j, i)`. Only the first
//! occurrence of each unordered pair is kept.

use std::collections::HashSet;

use crate::pairing::CandidatePair;

/// Flatten a neighbour table into unique index pairs.
///
/// Row `i` holds the neighbours of patch `i`. Self-pairs are dropped and each
/// unordered pair is kept in the orientation it was first seen.
pub fn remove_duplicates(neighbors: &[Vec<usize>]) -> Vec<[usize; 2]> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for (i, row) in neighbors.iter().enumerate() {
        for &j in row {
            if i == j {
                continue;
            }
            if seen.insert((i.min(j), i.max(j))) {
                unique.push([i, j]);
            }
        }
    }

    unique
}

/// Same rule over a flat list of candidate pairs.
pub fn dedup_pairs(pairs: &[CandidatePair]) -> Vec<CandidatePair> {
    let mut seen = HashSet::new();
    let unique: Vec<CandidatePair> = pairs
        .iter()
        .filter(|p| p.query != p.candidate)
        .filter(|p| seen.insert((p.query.min(p.candidate), p.query.max(p.candidate))))
        .copied()
        .collect();

    tracing::info!(
        before = pairs.len(),
        after = unique.len(),
        "Removed duplicate pairs"
    );

    unique
}
