//! Candidate pair generation by nearest-neighbour search.
//!
//! Every scale's bucketed patches are pooled into one [`PatchArena`] with
//! stable [`PatchId`] handles. Low-texture patches from all scales form the
//! candidate pool, indexed once in a k-d tree over their normalized vectors.
//! Each scale's high-texture patches are then queried against that tree.

#[cfg(test)]
mod tests;

pub mod kdtree;

pub use kdtree::KdTree;

use bytemuck::{Pod, Zeroable};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::Config;
use crate::dedup::remove_duplicates;
use crate::error::{Error, Result};
use crate::patch::{Bucketed, Patch, PatchSet, PatchSetMeta, PatchStage};

// ============================================================================
// Arena
// ============================================================================

/// Handle of a patch in a [`PatchArena`]: its position in scale-concatenated order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct PatchId(pub u32);

impl PatchId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A query patch and one of its nearest candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct CandidatePair {
    pub query: PatchId,
    pub candidate: PatchId,
}

/// Where one scale's patches sit in the arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSpan {
    pub meta: PatchSetMeta,
    /// Id of the scale's first patch.
    pub offset: usize,
    pub len: usize,
}

impl ScaleSpan {
    pub fn ids(&self) -> impl Iterator<Item = PatchId> + use<> {
        (self.offset..self.offset + self.len).map(|i| PatchId(i as u32))
    }
}

/// All bucketed patches of every scale, concatenated in scale order.
#[derive(Debug, Clone)]
pub struct PatchArena {
    patches: Vec<Patch>,
    spans: Vec<ScaleSpan>,
}

impl PatchArena {
    pub fn new(sets: Vec<PatchSet<Bucketed>>) -> Self {
        let total = sets.iter().map(PatchSet::len).sum();
        debug_assert!(total <= u32::MAX as usize);

        let mut patches = Vec::with_capacity(total);
        let mut spans = Vec::with_capacity(sets.len());
        for set in sets {
            spans.push(ScaleSpan {
                meta: *set.meta(),
                offset: patches.len(),
                len: set.len(),
            });
            patches.extend(set.into_patches());
        }

        Self { patches, spans }
    }

    #[inline]
    pub fn get(&self, id: PatchId) -> &Patch {
        &self.patches[id.index()]
    }

    #[inline]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    #[inline]
    pub fn spans(&self) -> &[ScaleSpan] {
        &self.spans
    }

    /// Patches of one span.
    pub fn scale_patches(&self, span: &ScaleSpan) -> &[Patch] {
        &self.patches[span.offset..span.offset + span.len]
    }

    /// Patch count per scale, in scale order.
    pub fn patches_per_scale(&self) -> Vec<usize> {
        self.spans.iter().map(|s| s.len).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

// ============================================================================
// Pair generation
// ============================================================================

/// Output of [`generate_pairs`].
#[derive(Debug, Clone, Default)]
pub struct PairGeneration {
    pub pairs: Vec<CandidatePair>,
    /// Patches pooled into the candidate tree.
    pub candidate_count: usize,
    /// Query patches actually searched, after subsampling.
    pub query_count: usize,
}

/// Deterministic subsample of `count` positions out of `len`, sorted ascending.
///
/// Returns every position when `len <= count`.
pub fn subsample_indices(len: usize, count: usize, seed: u64) -> Vec<usize> {
    if len <= count {
        return (0..len).collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, len, count).into_vec();
    picked.sort_unstable();
    picked
}

/// Find the `k_nearest` candidates of every query patch.
///
/// Candidates are patches in `config.candidate_buckets` from all scales;
/// queries are patches in `config.query_buckets`, capped per scale at
/// `config.num_query_patches`. A scale with no query patches contributes no
/// pairs. Fails when no candidates exist at all or when there are fewer
/// candidates than `k_nearest`.
pub fn generate_pairs(arena: &PatchArena, config: &Config) -> Result<PairGeneration> {
    let candidate_ids: Vec<PatchId> = arena
        .spans()
        .iter()
        .flat_map(ScaleSpan::ids)
        .filter(|&id| config.candidate_buckets.contains(arena.get(id).bucket()))
        .collect();

    if candidate_ids.is_empty() {
        return Err(Error::EmptyResult {
            stage: "candidate selection",
        });
    }
    if config.k_nearest > candidate_ids.len() {
        return Err(Error::invalid_config(
            "k_nearest",
            format!(
                "{} exceeds the {} available candidate patches",
                config.k_nearest,
                candidate_ids.len()
            ),
        ));
    }

    let dim = arena.get(candidate_ids[0]).normalized().len();
    let vectors: Vec<f32> = candidate_ids
        .iter()
        .flat_map(|&id| arena.get(id).normalized().iter().copied())
        .collect();
    let tree = KdTree::build(vectors, dim).ok_or(Error::EmptyResult {
        stage: "candidate selection",
    })?;

    let candidates = candidate_ids.as_slice();
    let mut pairs = Vec::new();
    let mut query_count = 0;
    for span in arena.spans() {
        let scale_index = span.meta.scale_index;
        let queries: Vec<PatchId> = span
            .ids()
            .filter(|&id| config.query_buckets.contains(arena.get(id).bucket()))
            .collect();

        if queries.is_empty() {
            tracing::warn!(scale_index, "No query patches at this scale");
            continue;
        }

        let selected = subsample_indices(queries.len(), config.num_query_patches, config.seed);
        let scale_pairs: Vec<CandidatePair> = selected
            .par_iter()
            .flat_map_iter(|&q| {
                let query = queries[q];
                tree.k_nearest(arena.get(query).normalized(), config.k_nearest)
                    .into_iter()
                    .map(move |(local, _)| CandidatePair {
                        query,
                        candidate: candidates[local],
                    })
            })
            .collect();

        tracing::debug!(
            scale_index,
            available = queries.len(),
            queried = selected.len(),
            pairs = scale_pairs.len(),
            "Queried candidate tree"
        );

        query_count += selected.len();
        pairs.extend(scale_pairs);
    }

    tracing::info!(
        candidates = candidate_ids.len(),
        queries = query_count,
        pairs = pairs.len(),
        "Generated candidate pairs"
    );

    Ok(PairGeneration {
        pairs,
        candidate_count: candidate_ids.len(),
        query_count,
    })
}

// ============================================================================
// Raw-pixel neighbours
// ============================================================================

/// The `k` nearest neighbours of every patch by raw pixel distance, the patch
/// itself included. Rows follow the set's patch order.
pub fn raw_neighbor_table<S: PatchStage>(set: &PatchSet<S>, k: usize) -> Vec<Vec<usize>> {
    let Some(first) = set.patches().first() else {
        return Vec::new();
    };
    let dim = first.pixels().len();
    let points: Vec<f32> = set
        .patches()
        .iter()
        .flat_map(|p| p.pixels().iter().copied())
        .collect();
    let Some(tree) = KdTree::build(points, dim) else {
        return Vec::new();
    };

    set.patches()
        .par_iter()
        .map(|p| {
            tree.k_nearest(p.pixels(), k)
                .into_iter()
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect()
}

/// Pairs of look-alike patches within one scale: each patch with its closest
/// other patch, without self or mirrored duplicates.
pub fn raw_neighbor_pairs<S: PatchStage>(set: &PatchSet<S>) -> Vec<[usize; 2]> {
    let pairs = remove_duplicates(&raw_neighbor_table(set, 2));
    tracing::debug!(
        scale_index = set.scale_index(),
        pairs = pairs.len(),
        "Paired patches by raw pixels"
    );
    pairs
}
