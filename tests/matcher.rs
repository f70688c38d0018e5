//! Tests for pairwise matching and vote aggregation.

use std::time::Duration;

use geodedup::matcher::MatchStage;
use geodedup::synthetic::{color_oracles, ColorOracle, ScriptedCropSource};
use geodedup::{
    CancelToken, CandidatePair, Crop, DataWarning, Dataset, DedupConfig, DedupError, Detection,
    DetectionId, GeoPoint, ImageRecord, MatchOracle, OracleError, PixelBox, Verdict,
};

/// Oracle returning a fixed count for every pair.
struct FixedOracle(u64);

impl MatchOracle for FixedOracle {
    fn name(&self) -> &str {
        "fixed"
    }

    fn match_count(
        &self,
        _a: &Crop,
        _b: &Crop,
        _timeout: Duration,
    ) -> Result<u64, OracleError> {
        Ok(self.0)
    }

    fn threshold(&self) -> u64 {
        10
    }
}

/// Oracle that fails every call.
struct BrokenOracle;

impl MatchOracle for BrokenOracle {
    fn name(&self) -> &str {
        "broken"
    }

    fn match_count(
        &self,
        _a: &Crop,
        _b: &Crop,
        _timeout: Duration,
    ) -> Result<u64, OracleError> {
        Err(OracleError::Backend {
            reason: "connection refused".to_string(),
        })
    }

    fn threshold(&self) -> u64 {
        10
    }
}

fn shop_image(name: &str, id: u64, bbox: PixelBox) -> ImageRecord {
    ImageRecord {
        name: name.to_string(),
        location: Some(GeoPoint::new(47.37, 8.55)),
        detections: vec![Detection {
            id: DetectionId(id),
            class: "shop".to_string(),
            bbox,
            location: None,
        }],
    }
}

/// Two images, one shop detection each, same crop color.
fn same_color_fixture() -> (Dataset, ScriptedCropSource, Vec<CandidatePair>) {
    let bbox_a = PixelBox::from_size(0, 0, 120, 120);
    let bbox_b = PixelBox::from_size(40, 20, 120, 120);
    let dataset = Dataset::new(vec![
        shop_image("a.jpg", 1, bbox_a),
        shop_image("b.jpg", 2, bbox_b),
    ])
    .unwrap();

    let mut source = ScriptedCropSource::new();
    source.insert("a.jpg", bbox_a, [120, 30, 60]);
    source.insert("b.jpg", bbox_b, [120, 30, 60]);

    let pairs = vec![CandidatePair::new(DetectionId(1), DetectionId(2))];
    (dataset, source, pairs)
}

fn evaluate(
    dataset: &Dataset,
    oracles: &[Box<dyn MatchOracle>],
    source: &ScriptedCropSource,
    config: &DedupConfig,
    pairs: &[CandidatePair],
) -> geodedup::Result<(geodedup::MatchReport, Vec<DataWarning>)> {
    let stage = MatchStage {
        dataset,
        oracles,
        crop_source: source,
        config,
    };
    stage.evaluate(pairs, &CancelToken::new())
}

#[test]
fn test_unanimous_vote_is_duplicate() {
    let (dataset, source, pairs) = same_color_fixture();
    let oracles = color_oracles(3);

    let (report, warnings) =
        evaluate(&dataset, &oracles, &source, &DedupConfig::default(), &pairs).unwrap();

    assert!(warnings.is_empty());
    assert_eq!(report.skipped_pairs, 0);
    assert_eq!(report.verdicts.len(), 1);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.verdict, Verdict::Duplicate);
    assert_eq!(verdict.match_votes, 3);
    assert_eq!(verdict.oracle_failures, 0);
    assert_eq!(report.duplicate_count(), 1);
}

#[test]
fn test_minority_vote_is_distinct() {
    let (dataset, source, pairs) = same_color_fixture();
    // One yes vote against two below-threshold counts: 1 < 2 required.
    let oracles: Vec<Box<dyn MatchOracle>> = vec![
        Box::new(ColorOracle::new("color", 10)),
        Box::new(FixedOracle(0)),
        Box::new(FixedOracle(0)),
    ];

    let (report, _) =
        evaluate(&dataset, &oracles, &source, &DedupConfig::default(), &pairs).unwrap();

    assert_eq!(report.verdicts[0].verdict, Verdict::Distinct);
    assert_eq!(report.verdicts[0].match_votes, 1);
    assert_eq!(report.duplicate_count(), 0);
}

#[test]
fn test_vote_threshold_overrides_majority() {
    let (dataset, source, pairs) = same_color_fixture();
    let oracles: Vec<Box<dyn MatchOracle>> = vec![
        Box::new(ColorOracle::new("color", 10)),
        Box::new(FixedOracle(0)),
        Box::new(FixedOracle(0)),
    ];
    let config = DedupConfig {
        vote_threshold: Some(1),
        ..DedupConfig::default()
    };

    let (report, _) = evaluate(&dataset, &oracles, &source, &config, &pairs).unwrap();

    assert_eq!(report.verdicts[0].verdict, Verdict::Duplicate);
}

#[test]
fn test_count_equal_to_threshold_is_no_vote() {
    let (dataset, source, pairs) = same_color_fixture();
    // FixedOracle reports exactly its threshold: not strictly greater, no vote.
    let oracles: Vec<Box<dyn MatchOracle>> = vec![Box::new(FixedOracle(10))];
    let config = DedupConfig {
        vote_threshold: Some(1),
        ..DedupConfig::default()
    };

    let (report, _) = evaluate(&dataset, &oracles, &source, &config, &pairs).unwrap();

    assert_eq!(report.verdicts[0].verdict, Verdict::Distinct);
    assert_eq!(report.verdicts[0].match_votes, 0);
}

#[test]
fn test_all_oracles_failing_is_distinct() {
    let (dataset, source, pairs) = same_color_fixture();
    let oracles: Vec<Box<dyn MatchOracle>> =
        vec![Box::new(BrokenOracle), Box::new(BrokenOracle), Box::new(BrokenOracle)];

    let (report, _) =
        evaluate(&dataset, &oracles, &source, &DedupConfig::default(), &pairs).unwrap();

    let verdict = &report.verdicts[0];
    assert_eq!(verdict.verdict, Verdict::Distinct, "failures never force a merge");
    assert_eq!(verdict.match_votes, 0);
    assert_eq!(verdict.oracle_failures, 3);
    assert_eq!(report.failure_count(), 3);
}

#[test]
fn test_failures_do_not_block_a_healthy_majority() {
    let (dataset, source, pairs) = same_color_fixture();
    let oracles: Vec<Box<dyn MatchOracle>> = vec![
        Box::new(BrokenOracle),
        Box::new(ColorOracle::new("color-0", 10)),
        Box::new(ColorOracle::new("color-1", 10)),
    ];

    let (report, _) =
        evaluate(&dataset, &oracles, &source, &DedupConfig::default(), &pairs).unwrap();

    let verdict = &report.verdicts[0];
    assert_eq!(verdict.verdict, Verdict::Duplicate, "2 of 3 is still a majority");
    assert_eq!(verdict.match_votes, 2);
    assert_eq!(verdict.oracle_failures, 1);
}

#[test]
fn test_missing_crop_skips_pair() {
    let (dataset, _, pairs) = same_color_fixture();
    // Only a.jpg is scripted; the crop for detection 2 fails.
    let mut source = ScriptedCropSource::new();
    source.insert("a.jpg", PixelBox::from_size(0, 0, 120, 120), [120, 30, 60]);

    let (report, warnings) =
        evaluate(&dataset, &color_oracles(3), &source, &DedupConfig::default(), &pairs).unwrap();

    assert_eq!(report.skipped_pairs, 1);
    assert!(report.verdicts.is_empty());
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        &warnings[0],
        DataWarning::CropFailed { detection, .. } if *detection == DetectionId(2)
    ));
}

#[test]
fn test_no_oracles_is_fatal() {
    let (dataset, source, pairs) = same_color_fixture();
    let oracles: Vec<Box<dyn MatchOracle>> = Vec::new();

    let err = evaluate(&dataset, &oracles, &source, &DedupConfig::default(), &pairs).unwrap_err();

    assert!(matches!(err, DedupError::NoOracles));
}

#[test]
fn test_unknown_detection_in_pair_is_fatal() {
    let (dataset, source, _) = same_color_fixture();
    let pairs = vec![CandidatePair::new(DetectionId(1), DetectionId(99))];

    let err =
        evaluate(&dataset, &color_oracles(3), &source, &DedupConfig::default(), &pairs).unwrap_err();

    assert!(matches!(err, DedupError::UnknownDetection { id } if id == DetectionId(99)));
}

#[test]
fn test_cancelled_before_start() {
    let (dataset, source, pairs) = same_color_fixture();
    let oracles = color_oracles(3);
    let config = DedupConfig::default();
    let stage = MatchStage {
        dataset: &dataset,
        oracles: &oracles,
        crop_source: &source,
        config: &config,
    };
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = stage.evaluate(&pairs, &cancel).unwrap_err();

    assert!(matches!(
        err,
        DedupError::Cancelled { evaluated: 0, total: 1 }
    ));
}

#[test]
fn test_sequential_and_parallel_agree() {
    // 8 pairs, alternating same-color and different-color crops.
    let bbox = PixelBox::from_size(0, 0, 150, 150);
    let mut images = Vec::new();
    let mut source = ScriptedCropSource::new();
    let mut pairs = Vec::new();
    for pair_idx in 0..8u64 {
        let (left, right) = (2 * pair_idx + 1, 2 * pair_idx + 2);
        let left_name = format!("img_{left:02}.jpg");
        let right_name = format!("img_{right:02}.jpg");
        let base = [pair_idx as u8 * 10, 40, 200];
        let other = if pair_idx % 2 == 0 {
            base
        } else {
            [255 - base[0], 10, 5]
        };
        source.insert(&left_name, bbox, base);
        source.insert(&right_name, bbox, other);
        images.push(shop_image(&left_name, left, bbox));
        images.push(shop_image(&right_name, right, bbox));
        pairs.push(CandidatePair::new(DetectionId(left), DetectionId(right)));
    }
    let dataset = Dataset::new(images).unwrap();
    let oracles = color_oracles(3);

    let sequential = DedupConfig {
        concurrency_limit: 1,
        ..DedupConfig::default()
    };
    let parallel = DedupConfig {
        concurrency_limit: 4,
        ..DedupConfig::default()
    };

    let (seq_report, _) = evaluate(&dataset, &oracles, &source, &sequential, &pairs).unwrap();
    let (par_report, _) = evaluate(&dataset, &oracles, &source, &parallel, &pairs).unwrap();

    assert_eq!(seq_report.verdicts.len(), 8);
    assert_eq!(par_report.verdicts.len(), 8);
    for (seq, par) in seq_report.verdicts.iter().zip(&par_report.verdicts) {
        assert_eq!(seq.pair, par.pair, "verdict order must match input order");
        assert_eq!(seq.verdict, par.verdict);
        assert_eq!(seq.match_votes, par.match_votes);
    }
    assert_eq!(seq_report.duplicate_count(), 4, "every even pair matches");
}
