//! Rank-equalized texture buckets.
//!
//! Patches are ranked by their standard deviation and split into contiguous
//! rank groups of `round(N / B)` patches. The top bucket absorbs whatever is
//! left over, so every bucket except the last holds the same count no matter
//! how the raw values are distributed. When rounding up would leave the top
//! bucket empty the group size drops to `N / B`, so with `N >= B` every
//! bucket is used.

use crate::patch::{Bucketed, PatchSet, RankableStage};

/// Bucket label for each value, in input order.
///
/// Ties keep their input order. With fewer than `B` values no complete
/// partition exists and every value lands in the top bucket.
pub fn bucket_labels(values: &[f32], num_buckets: usize) -> Vec<u8> {
    debug_assert!((1..=256).contains(&num_buckets));

    let n = values.len();
    let top = num_buckets - 1;
    let mut interval = (n as f64 / num_buckets as f64).round() as usize;
    if top > 0 && interval * top >= n {
        interval = n / num_buckets;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut labels = vec![0u8; n];
    for (rank, &idx) in order.iter().enumerate() {
        let bucket = if interval == 0 {
            top
        } else {
            (rank / interval).min(top)
        };
        labels[idx] = bucket as u8;
    }
    labels
}

/// Assign every patch its bucket from the current ranking statistic.
pub fn bucketize<S: RankableStage>(set: PatchSet<S>, num_buckets: usize) -> PatchSet<Bucketed> {
    let labels = bucket_labels(&set.std_devs(), num_buckets);

    let mut set = set;
    for (patch, label) in set.patches_mut().iter_mut().zip(labels) {
        patch.bucket = label;
    }

    tracing::debug!(
        scale_index = set.scale_index(),
        patches = set.len(),
        num_buckets,
        "Assigned texture buckets"
    );

    set.into_stage()
}
