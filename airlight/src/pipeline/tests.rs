use super::*;
use crate::config::BucketRange;
use crate::testing::{banded_scene, hazy_scene, init_tracing};

const AIRLIGHT: [f32; 3] = [0.8, 0.85, 0.9];
const BANDS: [f32; 4] = [0.3, 0.5, 0.7, 0.9];

fn single_scale() -> Config {
    Config {
        scales: vec![1.0],
        ..Default::default()
    }
}

fn assert_close(actual: [f32; 3], expected: [f32; 3], tol: f32) {
    for c in 0..3 {
        assert!(
            (actual[c] - expected[c]).abs() < tol,
            "channel {c}: got {actual:?}, expected {expected:?}"
        );
    }
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = Config {
        query_buckets: BucketRange::new(4, 9),
        ..Default::default()
    };
    assert!(matches!(
        AirlightPipeline::new(config),
        Err(Error::InvalidConfig {
            parameter: "query_buckets",
            ..
        })
    ));
}

#[test]
fn test_banded_scene_recovers_airlight() {
    init_tracing();

    let image = banded_scene(64, 64, AIRLIGHT, 16, &BANDS);
    let pipeline = AirlightPipeline::new(single_scale()).unwrap();
    let result = pipeline.estimate(&image).unwrap();

    assert_close(result.airlight, AIRLIGHT, 0.03);

    let d = &result.diagnostics;
    assert_eq!(d.patches_per_scale, vec![29 * 29]);
    assert!(d.candidate_patches > 0 && d.query_patches > 0);
    assert_eq!(d.candidate_pairs, d.query_patches * pipeline.config().k_nearest);
    assert_eq!(d.pairs_after_dedup, d.candidate_pairs);
    assert!(d.pairs_after_filter <= d.pairs_after_dedup);
    assert!(d.pairs_after_outliers > 0 && d.pairs_after_outliers <= d.pairs_after_filter);
    assert!(d.mean_airlight_before_outliers.is_some());
    assert!(!d.cache_hit);
}

#[test]
fn test_dense_extraction_skips_smoothing() {
    let image = banded_scene(40, 40, AIRLIGHT, 10, &BANDS);
    let config = Config {
        extraction: ExtractionMode::Dense,
        ..single_scale()
    };
    let result = AirlightPipeline::new(config).unwrap().estimate(&image).unwrap();

    assert_eq!(result.diagnostics.patches_per_scale, vec![33 * 33]);
    assert_close(result.airlight, AIRLIGHT, 0.03);
}

#[test]
fn test_multi_scale_counts_are_consistent() {
    let image = hazy_scene(64, 64, AIRLIGHT, 12, 7);
    let config = Config {
        scales: vec![1.0, 0.75, 0.5],
        bypass_pair_filter: true,
        outlier_threshold: f32::MAX,
        remove_duplicates: true,
        ..Default::default()
    };
    let result = AirlightPipeline::new(config).unwrap().estimate(&image).unwrap();
    let d = &result.diagnostics;

    // 64 → 29×29, 48 → 21×21, 32 → 13×13 sparse grids.
    assert_eq!(d.patches_per_scale, vec![841, 441, 169]);
    assert!(d.pairs_after_dedup <= d.candidate_pairs);
    assert_eq!(d.pairs_after_filter, d.pairs_after_dedup);
    assert!(d.pairs_after_outliers > 0);
    assert!(result.airlight.iter().all(|v| v.is_finite()));
}

#[test]
fn test_uniform_image_fails_at_pair_filter() {
    let image = RgbImage::filled(32, 32, [0.5, 0.5, 0.5]);
    let pipeline = AirlightPipeline::new(single_scale()).unwrap();

    let err = pipeline.estimate(&image).unwrap_err();
    assert!(matches!(err, Error::EmptyResult { stage: "pair filter" }));
    assert!(err.is_recoverable());
}

#[test]
fn test_uniform_image_with_bypass_fails_at_outlier_removal() {
    let image = RgbImage::filled(32, 32, [0.5, 0.5, 0.5]);
    let config = Config {
        bypass_pair_filter: true,
        ..single_scale()
    };

    let err = AirlightPipeline::new(config).unwrap().estimate(&image).unwrap_err();
    assert!(matches!(
        err,
        Error::EmptyResult {
            stage: "outlier removal"
        }
    ));
}

#[test]
fn test_image_smaller_than_patch_is_empty() {
    let image = RgbImage::filled(5, 5, [0.2, 0.3, 0.4]);
    let pipeline = AirlightPipeline::new(single_scale()).unwrap();

    assert!(matches!(
        pipeline.estimate(&image),
        Err(Error::EmptyResult {
            stage: "patch extraction"
        })
    ));
}

#[test]
fn test_cache_hit_reproduces_result() {
    let dir = common::test_utils::test_output_dir("pipeline_cache_hit");
    let cache = CacheStore::new(&dir);
    let config = single_scale();
    let key = CacheKey::new("banded_scene", &config).unwrap();
    let pipeline = AirlightPipeline::new(config).unwrap();
    let image = banded_scene(64, 64, AIRLIGHT, 16, &BANDS);

    let first = pipeline.estimate_with_cache(&image, &cache, &key).unwrap();
    assert!(!first.diagnostics.cache_hit);

    let second = pipeline.estimate_with_cache(&image, &cache, &key).unwrap();
    assert!(second.diagnostics.cache_hit);
    assert_eq!(first.airlight, second.airlight);
    assert_eq!(
        first.diagnostics.pairs_after_outliers,
        second.diagnostics.pairs_after_outliers
    );
    assert_eq!(first.diagnostics.patches_per_scale, second.diagnostics.patches_per_scale);
}

#[test]
fn test_unreadable_cache_entry_recomputes() {
    init_tracing();

    let dir = common::test_utils::test_output_dir("pipeline_unreadable_cache");
    let cache = CacheStore::new(&dir);
    let config = single_scale();
    let key = CacheKey::new("banded_scene", &config).unwrap();
    // A directory where the manifest should be fails the read without being a miss.
    std::fs::create_dir_all(dir.join(format!("{}.json", key.as_str()))).unwrap();

    let pipeline = AirlightPipeline::new(config).unwrap();
    let image = banded_scene(64, 64, AIRLIGHT, 16, &BANDS);
    assert!(cache.load(&key).is_err());

    let cached = pipeline.estimate_with_cache(&image, &cache, &key).unwrap();
    let fresh = pipeline.estimate(&image).unwrap();
    assert!(!cached.diagnostics.cache_hit);
    assert_eq!(cached.airlight, fresh.airlight);
}

#[test]
fn test_result_serializes_to_json() {
    let image = banded_scene(64, 64, AIRLIGHT, 16, &BANDS);
    let result = AirlightPipeline::new(single_scale())
        .unwrap()
        .estimate(&image)
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["airlight"].as_array().unwrap().len(), 3);
    assert_eq!(json["diagnostics"]["cache_hit"], false);
}
