use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::fs;

use aihub2yolo::augment::{flip_horizontal, flip_vertical, AugmentConfig, Augmenter};
use aihub2yolo::geometry::{denormalize, polygon_bbox, shape_bbox, GeometryConverter};
use aihub2yolo::validation::{AnnotationCheck, BBoxViolation};
use aihub2yolo::{
    ClassEntry, ClassMap, DatasetValidator, DatasetWriter, ImageMeta, NormalizedAnnotation,
    PixelBox, Shape, Split, Splitter,
};

fn class_map(n: usize) -> ClassMap {
    let entries = (0..n)
        .map(|i| ClassEntry {
            code: format!("C{i:02}"),
            name: format!("class{i:02}"),
        })
        .collect();
    ClassMap::from_entries(entries).unwrap()
}

#[test]
fn box_normalization_matches_reference_label_line() {
    let converter = GeometryConverter::default();
    let ann = converter
        .normalize(17, PixelBox::new(100.0, 100.0, 200.0, 150.0), 1920, 1080)
        .unwrap();

    assert_eq!(
        ann.to_label_line(),
        "17 0.104167 0.162037 0.104167 0.138889"
    );
}

#[test]
fn polygon_reduces_to_axis_aligned_bbox() {
    let bbox = polygon_bbox(&[(50.0, 50.0), (150.0, 50.0), (150.0, 120.0), (50.0, 120.0)]).unwrap();
    assert_eq!(bbox, PixelBox::new(50.0, 50.0, 100.0, 70.0));
}

#[test]
fn shape_bbox_covers_both_variants() {
    let from_box = shape_bbox(&Shape::Box {
        x: 5.0,
        y: 6.0,
        w: 7.0,
        h: 8.0,
    })
    .unwrap();
    assert_eq!(from_box, PixelBox::new(5.0, 6.0, 7.0, 8.0));

    let from_polygon = shape_bbox(&Shape::Polygon {
        points: vec![(10.0, 20.0), (30.0, 5.0), (25.0, 40.0)],
    })
    .unwrap();
    assert_eq!(from_polygon, PixelBox::new(10.0, 5.0, 20.0, 35.0));

    assert!(shape_bbox(&Shape::Polygon { points: vec![] }).is_none());
}

#[test]
fn normalization_round_trips_inside_boxes() {
    let converter = GeometryConverter::default();
    let bbox = PixelBox::new(37.0, 12.0, 240.0, 111.0);
    let ann = converter.normalize(3, bbox, 1280, 720).unwrap();
    let recovered = denormalize(&ann, 1280, 720);

    assert!((recovered.x - bbox.x).abs() < 1e-9);
    assert!((recovered.y - bbox.y).abs() < 1e-9);
    assert!((recovered.w - bbox.w).abs() < 1e-9);
    assert!((recovered.h - bbox.h).abs() < 1e-9);
}

#[test]
fn overhanging_box_is_clipped_into_unit_square() {
    let converter = GeometryConverter::default();
    // Overhangs the left edge by 10 px.
    let ann = converter
        .normalize(0, PixelBox::new(-10.0, 20.0, 60.0, 40.0), 100, 100)
        .unwrap();

    assert!(ann.cx - ann.w / 2.0 >= 0.0);
    assert!((ann.cx - ann.w / 2.0).abs() < 1e-12);
    assert!(((ann.cx + ann.w / 2.0) - 0.5).abs() < 1e-12);
}

#[test]
fn sub_pixel_box_is_dropped_as_degenerate() {
    let converter = GeometryConverter::default();
    assert!(converter
        .normalize(0, PixelBox::new(10.0, 10.0, 0.5, 20.0), 100, 100)
        .is_none());
    // Fully outside the frame clips down to nothing.
    assert!(converter
        .normalize(0, PixelBox::new(150.0, 150.0, 20.0, 20.0), 100, 100)
        .is_none());
}

#[test]
fn class_map_is_injective_and_dense() {
    let map = class_map(35);
    assert_eq!(map.num_classes(), 35);

    let mut seen = std::collections::HashSet::new();
    for i in 0..35 {
        let index = map.resolve(&format!("C{i:02}")).unwrap();
        assert!(index < 35);
        assert!(seen.insert(index), "index {index} assigned twice");
    }
    assert_eq!(seen.len(), 35);
    assert!(map.resolve("UNKNOWN").is_none());
}

#[test]
fn class_map_rejects_bad_tables() {
    assert!(ClassMap::from_entries(vec![]).is_err());

    let duplicate = vec![
        ClassEntry {
            code: "A".to_string(),
            name: "a".to_string(),
        },
        ClassEntry {
            code: "A".to_string(),
            name: "b".to_string(),
        },
    ];
    assert!(ClassMap::from_entries(duplicate).is_err());
}

#[test]
fn splitter_rejects_bad_ratios() {
    assert!(Splitter::new(0.7, 0.15, 0.15, 42).is_ok());
    assert!(Splitter::new(0.7, 0.2, 0.2, 42).is_err());
    assert!(Splitter::new(-0.1, 0.6, 0.5, 42).is_err());
}

#[test]
fn split_assignment_is_deterministic_and_order_independent() {
    let splitter = Splitter::new(0.7, 0.15, 0.15, 42).unwrap();
    let ids: Vec<String> = (0..500).map(|i| format!("record_{i:04}")).collect();

    let sequential: Vec<Split> = ids.iter().map(|id| splitter.assign(id)).collect();
    let parallel: Vec<Split> = ids.par_iter().map(|id| splitter.assign(id)).collect();
    let repeated: Vec<Split> = ids.iter().map(|id| splitter.assign(id)).collect();

    assert_eq!(sequential, parallel);
    assert_eq!(sequential, repeated);

    // Reversed iteration order changes nothing per id.
    for id in ids.iter().rev() {
        let expected = sequential[ids.iter().position(|x| x == id).unwrap()];
        assert_eq!(splitter.assign(id), expected);
    }
}

#[test]
fn split_sizes_are_approximately_proportional() {
    let splitter = Splitter::new(0.7, 0.15, 0.15, 42).unwrap();
    let mut counts = std::collections::HashMap::new();
    for i in 0..1000 {
        *counts.entry(splitter.assign(&format!("record_{i:04}"))).or_insert(0usize) += 1;
    }

    let train = counts.get(&Split::Train).copied().unwrap_or(0);
    let val = counts.get(&Split::Val).copied().unwrap_or(0);
    let test = counts.get(&Split::Test).copied().unwrap_or(0);

    assert_eq!(train + val + test, 1000);
    assert!((650..=750).contains(&train), "train bucket {train}");
    assert!((110..=190).contains(&val), "val bucket {val}");
    assert!((110..=190).contains(&test), "test bucket {test}");
}

#[test]
fn undersized_bbox_is_rejected_not_the_record() {
    let validator = DatasetValidator::default();

    let result = validator.validate_bbox(PixelBox::new(10.0, 10.0, 5.0, 30.0), 640, 480);
    assert!(matches!(result, Err(BBoxViolation::TooSmall { .. })));

    // A healthy sibling annotation still passes.
    assert!(validator
        .validate_bbox(PixelBox::new(10.0, 10.0, 30.0, 30.0), 640, 480)
        .is_ok());
}

#[test]
fn bbox_bounds_check_tolerates_clippable_overhang() {
    let validator = DatasetValidator::default();

    // Half a pixel over the edge is absorbed by clipping.
    assert!(validator
        .validate_bbox(PixelBox::new(-0.5, 0.0, 50.0, 50.0), 640, 480)
        .is_ok());

    let result = validator.validate_bbox(PixelBox::new(-20.0, 0.0, 50.0, 50.0), 640, 480);
    assert!(matches!(result, Err(BBoxViolation::OutOfBounds { .. })));
}

#[test]
fn annotation_check_distinguishes_class_and_geometry_failures() {
    let validator = DatasetValidator::default();
    let map = class_map(3);

    let unknown = aihub2yolo::RawAnnotation {
        class_code: "ZZ-99".to_string(),
        shape: Shape::Box {
            x: 10.0,
            y: 10.0,
            w: 50.0,
            h: 50.0,
        },
    };
    assert_eq!(
        validator.validate_annotation(&unknown, 640, 480, &map),
        AnnotationCheck::UnknownClass
    );

    let valid = aihub2yolo::RawAnnotation {
        class_code: "C01".to_string(),
        shape: Shape::Polygon {
            points: vec![(50.0, 50.0), (150.0, 50.0), (150.0, 120.0), (50.0, 120.0)],
        },
    };
    assert_eq!(
        validator.validate_annotation(&valid, 640, 480, &map),
        AnnotationCheck::Valid {
            class_index: 1,
            bbox: PixelBox::new(50.0, 50.0, 100.0, 70.0),
        }
    );

    let empty = aihub2yolo::RawAnnotation {
        class_code: "C00".to_string(),
        shape: Shape::Polygon { points: vec![] },
    };
    assert_eq!(
        validator.validate_annotation(&empty, 640, 480, &map),
        AnnotationCheck::EmptyShape
    );
}

#[test]
fn image_validation_reports_missing_and_undecodable_files() {
    let dir = tempfile::tempdir().unwrap();
    let validator = DatasetValidator::default();

    let missing = ImageMeta {
        path: dir.path().join("nope.jpg"),
        width: 64,
        height: 48,
    };
    assert!(validator.validate_image(&missing).is_err());

    let garbage_path = dir.path().join("garbage.jpg");
    fs::write(&garbage_path, b"not an image at all").unwrap();
    let garbage = ImageMeta {
        path: garbage_path,
        width: 64,
        height: 48,
    };
    assert!(validator.validate_image(&garbage).is_err());

    let good_path = dir.path().join("good.png");
    RgbImage::new(64, 48).save(&good_path).unwrap();
    let good = ImageMeta {
        path: good_path,
        width: 64,
        height: 48,
    };
    assert_eq!(validator.validate_image(&good).unwrap(), (64, 48));
}

#[test]
fn rotation_by_zero_is_identity() {
    let augmenter = Augmenter::new(AugmentConfig {
        enabled: true,
        ..AugmentConfig::default()
    });
    let image = RgbImage::new(64, 48);
    let boxes = vec![(2, PixelBox::new(10.0, 12.0, 20.0, 16.0))];

    let sample = augmenter.rotate(&image, &boxes, 0.0);
    assert_eq!(sample.boxes.len(), 1);
    let (class_index, rotated) = sample.boxes[0];
    assert_eq!(class_index, 2);
    assert!((rotated.x - 10.0).abs() < 1e-9);
    assert!((rotated.y - 12.0).abs() < 1e-9);
    assert!((rotated.w - 20.0).abs() < 1e-9);
    assert!((rotated.h - 16.0).abs() < 1e-9);
}

#[test]
fn rotated_bbox_contains_the_rotated_content() {
    let augmenter = Augmenter::new(AugmentConfig::default());
    let image = RgbImage::new(200, 200);
    let boxes = vec![(0, PixelBox::new(80.0, 80.0, 40.0, 40.0))];

    // A centered square rotated 45 degrees needs a wider AABB.
    let sample = augmenter.rotate(&image, &boxes, 45.0);
    let (_, rotated) = sample.boxes[0];
    assert!(rotated.w > 40.0);
    assert!(rotated.h > 40.0);
}

#[test]
fn rotation_drops_boxes_leaving_the_frame() {
    let augmenter = Augmenter::new(AugmentConfig::default());
    let image = RgbImage::new(200, 20);
    // Far-right sliver ends up far outside the short frame after 90 degrees.
    let boxes = vec![(0, PixelBox::new(190.0, 0.0, 10.0, 10.0))];

    let sample = augmenter.rotate(&image, &boxes, 90.0);
    assert!(sample.boxes.is_empty());
}

#[test]
fn horizontal_flip_is_involutive() {
    let image = RgbImage::new(64, 48);
    let boxes = vec![
        (0, PixelBox::new(10.0, 12.0, 20.0, 16.0)),
        (3, PixelBox::new(0.0, 0.0, 5.0, 5.0)),
    ];

    let once = flip_horizontal(&image, &boxes);
    let twice = flip_horizontal(&once.image, &once.boxes);
    assert_eq!(twice.boxes, boxes);

    let once = flip_vertical(&image, &boxes);
    let twice = flip_vertical(&once.image, &once.boxes);
    assert_eq!(twice.boxes, boxes);
}

#[test]
fn augment_all_emits_one_variant_per_technique() {
    let augmenter = Augmenter::new(AugmentConfig {
        enabled: true,
        augment_all: true,
        ..AugmentConfig::default()
    });
    let image = RgbImage::new(32, 32);
    let boxes = vec![(0, PixelBox::new(4.0, 4.0, 16.0, 16.0))];
    let mut rng = StdRng::seed_from_u64(7);

    let samples = augmenter.augment(&image, &boxes, &mut rng);
    // identity + rotation + horizontal flip + brightness + contrast + blur
    assert_eq!(samples.len(), 6);
    assert_eq!(samples[0].technique, "original");
    assert_eq!(samples[0].boxes, boxes);

    let techniques: Vec<&str> = samples.iter().map(|s| s.technique.as_str()).collect();
    assert!(techniques.iter().any(|t| t.starts_with("rotate_")));
    assert!(techniques.contains(&"flip_h"));
    assert!(techniques.iter().any(|t| t.starts_with("brightness_")));
    assert!(techniques.iter().any(|t| t.starts_with("contrast_")));
    assert!(techniques.contains(&"blur"));
}

#[test]
fn disabled_augmentation_yields_identity_only() {
    let augmenter = Augmenter::new(AugmentConfig::default());
    let image = RgbImage::new(32, 32);
    let boxes = vec![(0, PixelBox::new(4.0, 4.0, 16.0, 16.0))];
    let mut rng = StdRng::seed_from_u64(7);

    let samples = augmenter.augment(&image, &boxes, &mut rng);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].technique, "original");
}

#[test]
fn pixel_only_techniques_leave_geometry_unchanged() {
    let augmenter = Augmenter::new(AugmentConfig {
        enabled: true,
        augment_all: true,
        rotation_range_deg: 0.0,
        flip_horizontal: false,
        ..AugmentConfig::default()
    });
    let image = RgbImage::new(32, 32);
    let boxes = vec![(1, PixelBox::new(4.0, 4.0, 16.0, 16.0))];
    let mut rng = StdRng::seed_from_u64(11);

    for sample in augmenter.augment(&image, &boxes, &mut rng) {
        assert_eq!(sample.boxes, boxes, "technique {}", sample.technique);
    }
}

#[test]
fn writer_emits_labels_and_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DatasetWriter::create(dir.path(), "cat01", true).unwrap();

    let annotations = vec![
        NormalizedAnnotation {
            class_index: 17,
            cx: 0.104_166_666,
            cy: 0.162_037_037,
            w: 0.104_166_666,
            h: 0.138_888_888,
        },
        NormalizedAnnotation {
            class_index: 2,
            cx: 0.5,
            cy: 0.5,
            w: 0.25,
            h: 0.25,
        },
    ];
    writer
        .write_labels(Split::Train, "rec_0001_original", &annotations)
        .unwrap();

    let contents = fs::read_to_string(
        dir.path()
            .join("cat01/train/labels/rec_0001_original.txt"),
    )
    .unwrap();
    assert_eq!(
        contents,
        "17 0.104167 0.162037 0.104167 0.138889\n2 0.500000 0.500000 0.250000 0.250000\n"
    );

    writer.write_descriptor(&class_map(18)).unwrap();
    let descriptor: serde_yaml::Value =
        serde_yaml::from_str(&fs::read_to_string(dir.path().join("cat01/data.yaml")).unwrap())
            .unwrap();
    assert_eq!(descriptor["train"].as_str(), Some("train/images"));
    assert_eq!(descriptor["val"].as_str(), Some("val/images"));
    assert_eq!(descriptor["test"].as_str(), Some("test/images"));
    assert_eq!(descriptor["nc"].as_u64(), Some(18));
    assert_eq!(descriptor["names"][17].as_str(), Some("class17"));

    // No temp files left behind.
    let leftovers: Vec<_> = walk_files(dir.path())
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn writer_without_test_split_omits_test_entry() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DatasetWriter::create(dir.path(), "cat01", false).unwrap();
    writer.write_descriptor(&class_map(3)).unwrap();

    let contents = fs::read_to_string(dir.path().join("cat01/data.yaml")).unwrap();
    assert!(!contents.contains("test:"));
    assert!(!dir.path().join("cat01/test").exists());
}

fn walk_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(dir).unwrap().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}
