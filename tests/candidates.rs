//! Tests for candidate pair generation.

use geodedup::candidates::{self, CandidateSet};
use geodedup::geo::lat_degrees;
use geodedup::{
    CandidatePair, DataWarning, Dataset, DedupConfig, Detection, DetectionId, GeoPoint,
    ImageRecord, PixelBox, SpatialIndex,
};

const BASE: GeoPoint = GeoPoint {
    latitude: 47.37,
    longitude: 8.55,
};

fn detection(id: u64, class: &str) -> Detection {
    Detection {
        id: DetectionId(id),
        class: class.to_string(),
        bbox: PixelBox::from_size(10, 10, 100, 80),
        location: None,
    }
}

fn image_at(name: &str, north_meters: f64, detections: Vec<Detection>) -> ImageRecord {
    ImageRecord {
        name: name.to_string(),
        location: Some(GeoPoint::new(
            BASE.latitude + lat_degrees(north_meters),
            BASE.longitude,
        )),
        detections,
    }
}

/// Run the whole scope -> index -> pairs chain the way the engine does.
fn generate(dataset: &Dataset, config: &DedupConfig) -> CandidateSet {
    let scope = candidates::collect_scope(dataset, config);
    let (points, _) = candidates::index_points(dataset, &scope);
    let index = SpatialIndex::build(points);
    candidates::generate(dataset, &index, &scope, config.radius_meters)
}

#[test]
fn test_same_class_across_nearby_images_pairs() {
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop")]),
        image_at("b.jpg", 10.0, vec![detection(2, "shop")]),
    ])
    .unwrap();

    let set = generate(&dataset, &DedupConfig::default());

    assert_eq!(set.image_pairs, 1);
    assert_eq!(
        set.pairs,
        vec![CandidatePair::new(DetectionId(1), DetectionId(2))]
    );
}

#[test]
fn test_no_pairs_beyond_radius() {
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop")]),
        image_at("b.jpg", 50.0, vec![detection(2, "shop")]),
    ])
    .unwrap();

    let set = generate(&dataset, &DedupConfig::default());

    assert_eq!(set.image_pairs, 0);
    assert!(set.pairs.is_empty());
}

#[test]
fn test_no_pairs_across_classes() {
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop")]),
        image_at("b.jpg", 5.0, vec![detection(2, "sign")]),
    ])
    .unwrap();

    let set = generate(&dataset, &DedupConfig::default());

    assert_eq!(set.image_pairs, 1, "the images are neighbors");
    assert!(set.pairs.is_empty(), "their detections carry different classes");
}

#[test]
fn test_no_pairs_within_one_image() {
    // Two same-class detections in one frame are two different shops.
    let dataset = Dataset::new(vec![image_at(
        "a.jpg",
        0.0,
        vec![detection(1, "shop"), detection(2, "shop")],
    )])
    .unwrap();

    let set = generate(&dataset, &DedupConfig::default());

    assert!(set.pairs.is_empty());
}

#[test]
fn test_pairs_are_canonical_and_unique() {
    // a carries two shops, all three images mutually within 30m.
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(4, "shop"), detection(1, "shop")]),
        image_at("b.jpg", 8.0, vec![detection(3, "shop")]),
        image_at("c.jpg", 16.0, vec![detection(2, "shop")]),
    ])
    .unwrap();

    let set = generate(&dataset, &DedupConfig::default());

    for pair in &set.pairs {
        assert!(pair.left < pair.right, "pair {pair} is not canonical");
    }

    let mut deduped = set.pairs.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), set.pairs.len(), "duplicate pairs emitted");

    // Image pairs (a,b), (a,c), (b,c); the a-pairs double up on a's two shops.
    assert_eq!(set.image_pairs, 3);
    assert_eq!(set.pairs.len(), 5);
}

#[test]
fn test_class_filter_restricts_scope() {
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop"), detection(2, "sign")]),
        image_at("b.jpg", 5.0, vec![detection(3, "shop"), detection(4, "sign")]),
    ])
    .unwrap();

    let config = DedupConfig {
        class_filter: vec!["sign".to_string()],
        ..DedupConfig::default()
    };
    let set = generate(&dataset, &config);

    assert_eq!(
        set.pairs,
        vec![CandidatePair::new(DetectionId(2), DetectionId(4))]
    );
}

#[test]
fn test_degenerate_box_dropped_with_warning() {
    let mut flat = detection(2, "shop");
    flat.bbox = PixelBox::new(10, 10, 200, 10);
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop")]),
        image_at("b.jpg", 5.0, vec![flat]),
    ])
    .unwrap();

    let config = DedupConfig::default();
    let scope = candidates::collect_scope(&dataset, &config);

    assert_eq!(scope.matchable, 1);
    assert_eq!(scope.warnings.len(), 1);
    assert!(matches!(
        &scope.warnings[0],
        DataWarning::DegenerateBox { detection, image }
            if *detection == DetectionId(2) && image == "b.jpg"
    ));

    let (points, _) = candidates::index_points(&dataset, &scope);
    let index = SpatialIndex::build(points);
    let set = candidates::generate(&dataset, &index, &scope, config.radius_meters);
    assert!(set.pairs.is_empty(), "a dropped detection cannot pair");
}

#[test]
fn test_unlocated_image_reported_and_skipped() {
    let mut unlocated = image_at("b.jpg", 5.0, vec![detection(2, "shop")]);
    unlocated.location = None;
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop")]),
        unlocated,
    ])
    .unwrap();

    let config = DedupConfig::default();
    let scope = candidates::collect_scope(&dataset, &config);
    let (points, warnings) = candidates::index_points(&dataset, &scope);

    assert_eq!(points.len(), 1);
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        &warnings[0],
        DataWarning::MissingCoordinate { image } if image == "b.jpg"
    ));

    let index = SpatialIndex::build(points);
    let set = candidates::generate(&dataset, &index, &scope, config.radius_meters);
    assert!(set.pairs.is_empty());
}

#[test]
fn test_out_of_range_coordinate_treated_as_missing() {
    let mut broken = image_at("b.jpg", 5.0, vec![detection(2, "shop")]);
    broken.location = Some(GeoPoint::new(91.0, 8.55));
    let dataset = Dataset::new(vec![
        image_at("a.jpg", 0.0, vec![detection(1, "shop")]),
        broken,
    ])
    .unwrap();

    let scope = candidates::collect_scope(&dataset, &DedupConfig::default());
    let (points, warnings) = candidates::index_points(&dataset, &scope);

    assert_eq!(points.len(), 1);
    assert!(matches!(
        &warnings[0],
        DataWarning::MissingCoordinate { image } if image == "b.jpg"
    ));
}
