use super::*;
use crate::hazy_image::RgbImage;

fn level(image: RgbImage) -> ScaleLevel {
    ScaleLevel {
        index: 0,
        factor: 1.0,
        image,
    }
}

fn ramp(width: usize, height: usize) -> RgbImage {
    let pixels = (0..width * height)
        .flat_map(|i| {
            let v = i as f32 / (width * height) as f32;
            [v, v * 0.5, 0.25]
        })
        .collect();
    RgbImage::from_pixels(width, height, pixels).unwrap()
}

#[test]
fn test_grid_shape_excludes_last_offset() {
    let sparse = GridShape::for_extraction(20, 15, 7, 2);
    assert_eq!(sparse, GridShape { rows: 4, cols: 7 });

    let dense = GridShape::for_extraction(20, 15, 7, 1);
    assert_eq!(dense, GridShape { rows: 8, cols: 13 });
}

#[test]
fn test_grid_shape_small_image_is_empty() {
    assert!(GridShape::for_extraction(7, 7, 7, 2).is_empty());
    assert!(GridShape::for_extraction(3, 30, 7, 1).is_empty());
}

#[test]
fn test_extraction_row_major_positions() {
    let set = extract_patches(&level(ramp(20, 15)), 7, 2);
    assert_eq!(set.len(), 28);
    assert_eq!(set.meta().grid, GridShape { rows: 4, cols: 7 });

    let first = set.patches()[0].position();
    assert_eq!((first.row, first.col), (0, 0));
    let second = set.patches()[1].position();
    assert_eq!((second.row, second.col), (0, 2));
    let eighth = set.patches()[7].position();
    assert_eq!((eighth.row, eighth.col), (2, 0));
    let last = set.patches()[27].position();
    assert_eq!((last.row, last.col), (6, 12));
}

#[test]
fn test_extracted_pixels_match_source() {
    let image = ramp(12, 10);
    let set = extract_patches(&level(image.clone()), 3, 2);
    let patch = &set.patches()[5];
    let pos = patch.position();
    for dy in 0..3 {
        for dx in 0..3 {
            let expected = image.get(pos.col + dx, pos.row + dy);
            let idx = (dy * 3 + dx) * 3;
            assert_eq!(&patch.pixels()[idx..idx + 3], &expected);
        }
    }
}

#[test]
fn test_flat_patch_has_zero_std_and_zero_vector() {
    let set = extract_patches(&level(RgbImage::filled(16, 16, [0.4, 0.6, 0.8])), 7, 2);
    assert!(!set.is_empty());
    for patch in set.patches() {
        assert!(patch.raw_std_dev() < MIN_STD_DEV);
        assert!(patch.normalized().iter().all(|&v| v == 0.0));
        let m = patch.mean();
        assert!((m[0] - 0.4).abs() < 1e-6);
        assert!((m[1] - 0.6).abs() < 1e-6);
        assert!((m[2] - 0.8).abs() < 1e-6);
    }
}

#[test]
fn test_patch_statistics() {
    // Two pixels: (0, 0, 0) and (1, 1, 1). Every channel has mean 0.5.
    let patch = Patch::from_pixels(
        vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        PatchPosition {
            scale_index: 0,
            row: 0,
            col: 0,
        },
    );
    assert_eq!(patch.mean(), [0.5, 0.5, 0.5]);
    assert!((patch.raw_std_dev() - 0.5).abs() < 1e-6);
    assert_eq!(patch.std_dev(), patch.raw_std_dev());
    assert_eq!(patch.normalized(), &[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn test_textured_patch_vector_is_centred_per_channel() {
    let set = extract_patches(&level(ramp(16, 16)), 7, 2);
    let patch = &set.patches()[3];
    assert!(patch.raw_std_dev() > MIN_STD_DEV);
    for c in 0..3 {
        let sum: f32 = patch.normalized().iter().skip(c).step_by(3).sum();
        assert!(sum.abs() < 1e-3, "channel {c} sum {sum}");
    }
}

#[test]
fn test_image_equal_to_patch_yields_empty_set() {
    let set = extract_patches(&level(ramp(7, 7)), 7, 1);
    assert!(set.is_empty());
    assert!(set.meta().grid.is_empty());
}
