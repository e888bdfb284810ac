use super::*;
use crate::bucket::bucketize;
use crate::hazy_image::RgbImage;
use crate::patch::extract_patches;
use crate::scale::build_scales;
use crate::smoothing::smooth_patches;
use crate::testing::{hazy_scene, init_tracing, noise_texture};

fn bucketed_sets(image: &RgbImage, scales: &[f32]) -> Vec<PatchSet<Bucketed>> {
    build_scales(image, scales)
        .iter()
        .map(|level| {
            let raw = extract_patches(level, 7, 2);
            bucketize(smooth_patches(raw).unwrap(), 10)
        })
        .collect()
}

fn scene_arena() -> PatchArena {
    let image = hazy_scene(64, 64, [0.8, 0.85, 0.9], 12, 7);
    PatchArena::new(bucketed_sets(&image, &[1.0, 0.75, 0.5]))
}

#[test]
fn test_arena_offsets_follow_scale_order() {
    let arena = scene_arena();
    let spans = arena.spans();
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[0].offset, 0);
    for w in spans.windows(2) {
        assert_eq!(w[1].offset, w[0].offset + w[0].len);
    }
    assert_eq!(arena.len(), spans.iter().map(|s| s.len).sum::<usize>());

    for span in spans {
        for (id, patch) in span.ids().zip(arena.scale_patches(span)) {
            assert_eq!(arena.get(id).position(), patch.position());
            assert_eq!(patch.position().scale_index, span.meta.scale_index);
        }
    }
}

#[test]
fn test_subsample_is_sorted_deterministic_and_distinct() {
    let a = subsample_indices(500, 40, 0);
    let b = subsample_indices(500, 40, 0);
    assert_eq!(a, b);
    assert_eq!(a.len(), 40);
    assert!(a.windows(2).all(|w| w[0] < w[1]));
    assert!(a.iter().all(|&i| i < 500));

    assert_ne!(subsample_indices(500, 40, 1), a);
}

#[test]
fn test_subsample_keeps_everything_when_under_cap() {
    assert_eq!(subsample_indices(5, 10, 0), vec![0, 1, 2, 3, 4]);
    assert_eq!(subsample_indices(5, 5, 0), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_pairs_link_query_buckets_to_candidate_buckets() {
    init_tracing();
    let arena = scene_arena();
    let config = Config::default();
    let generation = generate_pairs(&arena, &config).unwrap();

    assert!(!generation.pairs.is_empty());
    assert_eq!(generation.pairs.len(), generation.query_count * config.k_nearest);

    for pair in &generation.pairs {
        let query = arena.get(pair.query);
        let candidate = arena.get(pair.candidate);
        assert!(config.query_buckets.contains(query.bucket()));
        assert!(config.candidate_buckets.contains(candidate.bucket()));
    }
}

#[test]
fn test_candidate_is_true_nearest_neighbour() {
    let arena = scene_arena();
    let config = Config {
        k_nearest: 1,
        ..Config::default()
    };
    let generation = generate_pairs(&arena, &config).unwrap();

    let candidates: Vec<PatchId> = arena
        .spans()
        .iter()
        .flat_map(ScaleSpan::ids)
        .filter(|&id| config.candidate_buckets.contains(arena.get(id).bucket()))
        .collect();
    let dist = |a: &[f32], b: &[f32]| -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    };

    for pair in generation.pairs.iter().take(25) {
        let q = arena.get(pair.query).normalized();
        let best = candidates
            .iter()
            .map(|&id| dist(q, arena.get(id).normalized()))
            .fold(f32::INFINITY, f32::min);
        let got = dist(q, arena.get(pair.candidate).normalized());
        assert!((got - best).abs() <= 1e-4 * best.max(1.0));
    }
}

#[test]
fn test_query_count_is_capped_per_scale() {
    let arena = scene_arena();
    let config = Config {
        num_query_patches: 10,
        k_nearest: 2,
        ..Config::default()
    };
    let generation = generate_pairs(&arena, &config).unwrap();
    assert_eq!(generation.query_count, 30);
    assert_eq!(generation.pairs.len(), 60);
}

#[test]
fn test_k_exceeding_candidates_is_invalid_config() {
    let arena = scene_arena();
    let config = Config {
        k_nearest: arena.len() + 1,
        ..Config::default()
    };
    let err = generate_pairs(&arena, &config).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidConfig {
            parameter: "k_nearest",
            ..
        }
    ));
}

#[test]
fn test_no_candidates_is_empty_result() {
    // 2x2 patch grid: fewer patches than buckets, all land on top.
    let image = noise_texture(11, 11, 3);
    let arena = PatchArena::new(bucketed_sets(&image, &[1.0]));
    assert_eq!(arena.len(), 4);
    let err = generate_pairs(&arena, &Config::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::EmptyResult {
            stage: "candidate selection"
        }
    ));
}

#[test]
fn test_scale_without_queries_contributes_nothing() {
    let config = Config {
        k_nearest: 1,
        ..Config::default()
    };
    let mut sets = bucketed_sets(&noise_texture(40, 40, 1), &[1.0]);
    // Second scale: 4 patches, all in the top bucket, so queries but no candidates.
    sets.extend(bucketed_sets(&noise_texture(11, 11, 2), &[1.0]));
    // Third scale: only candidate buckets.
    let mut low = bucketed_sets(&noise_texture(40, 40, 3), &[1.0]).remove(0);
    for patch in low.patches_mut() {
        patch.bucket = 0;
    }
    sets.push(low);

    let arena = PatchArena::new(sets);
    let generation = generate_pairs(&arena, &config).unwrap();
    let third = arena.spans()[2];
    assert!(
        generation
            .pairs
            .iter()
            .all(|p| !(third.offset..third.offset + third.len).contains(&p.query.index()))
    );
}

#[test]
fn test_raw_neighbor_table_includes_self() {
    let image = noise_texture(30, 30, 9);
    let set = extract_patches(&build_scales(&image, &[1.0])[0], 7, 2);
    let table = raw_neighbor_table(&set, 2);
    assert_eq!(table.len(), set.len());
    for (i, row) in table.iter().enumerate() {
        assert_eq!(row.len(), 2);
        assert_eq!(row[0], i);
    }
}

#[test]
fn test_raw_neighbor_pairs_are_unique() {
    let image = noise_texture(30, 30, 9);
    let set = extract_patches(&build_scales(&image, &[1.0])[0], 7, 2);
    let pairs = raw_neighbor_pairs(&set);
    assert!(!pairs.is_empty());
    assert!(pairs.len() <= set.len());
    for &[i, j] in &pairs {
        assert_ne!(i, j);
        assert!(!pairs.contains(&[j, i]));
    }
}
