//! Candidate pair generation.
//!
//! Two detections become a candidate pair when they carry the same class
//! label, sit on different images, and those images are mutual neighbors
//! within the configured radius. Every unordered pair is produced exactly
//! once: image pairs are canonicalized by index and detection pairs by id.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::DataWarning;
use crate::spatial::{ImagePoint, SpatialIndex};
use crate::{Dataset, DedupConfig, DetectionId};

/// Unordered pair of detection ids, stored with `left < right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePair {
    pub left: DetectionId,
    pub right: DetectionId,
}

impl CandidatePair {
    /// Canonicalize the pair: the smaller id goes left.
    pub fn new(a: DetectionId, b: DetectionId) -> Self {
        if a <= b {
            Self { left: a, right: b }
        } else {
            Self { left: b, right: a }
        }
    }
}

impl std::fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Which detections participate in matching, image by image.
#[derive(Debug, Clone)]
pub struct MatchScope {
    /// Per dataset image index: slots of eligible detections.
    pub per_image: Vec<Vec<usize>>,
    /// Degenerate-box findings collected while filtering.
    pub warnings: Vec<DataWarning>,
    /// Total number of eligible detections.
    pub matchable: usize,
}

/// Apply the class filter and drop degenerate boxes.
pub fn collect_scope(dataset: &Dataset, config: &DedupConfig) -> MatchScope {
    let mut per_image = Vec::with_capacity(dataset.image_count());
    let mut warnings = Vec::new();
    let mut matchable = 0;

    for image in dataset.images() {
        let mut slots = Vec::new();
        for (slot, det) in image.detections.iter().enumerate() {
            if !config.class_allowed(&det.class) {
                continue;
            }
            if det.bbox.is_degenerate() {
                let warning = DataWarning::DegenerateBox {
                    detection: det.id,
                    image: image.name.clone(),
                };
                warn!("{warning}");
                warnings.push(warning);
                continue;
            }
            slots.push(slot);
        }
        matchable += slots.len();
        per_image.push(slots);
    }

    MatchScope {
        per_image,
        warnings,
        matchable,
    }
}

/// Positions of images that belong in the spatial index: a usable coordinate
/// and at least one in-scope detection. Images without a usable coordinate
/// are reported, not dropped; their detections simply never become
/// candidates.
pub fn index_points(dataset: &Dataset, scope: &MatchScope) -> (Vec<ImagePoint>, Vec<DataWarning>) {
    let mut points = Vec::new();
    let mut warnings = Vec::new();

    for (img_idx, image) in dataset.images().iter().enumerate() {
        let located = image.location.filter(|loc| loc.is_valid());
        if located.is_none() {
            let warning = DataWarning::MissingCoordinate {
                image: image.name.clone(),
            };
            warn!("{warning}");
            warnings.push(warning);
            continue;
        }
        if scope.per_image[img_idx].is_empty() {
            continue;
        }
        if let Some(loc) = located {
            points.push(ImagePoint::new(img_idx, &loc));
        }
    }

    (points, warnings)
}

/// Unique unordered image pairs whose positions are mutual neighbors,
/// ascending by index. Each pair is emitted once, from its lower-index side.
pub fn image_pairs(index: &SpatialIndex, radius_meters: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for point in index.iter() {
        for neighbor in index.neighbors(point, radius_meters) {
            if neighbor > point.image {
                pairs.push((point.image, neighbor));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Cross product of same-class detections for every image pair.
pub fn detection_pairs(
    dataset: &Dataset,
    scope: &MatchScope,
    image_pairs: &[(usize, usize)],
) -> Vec<CandidatePair> {
    let images = dataset.images();
    let mut pairs = Vec::new();

    for &(a, b) in image_pairs {
        let mut by_class: BTreeMap<&str, Vec<DetectionId>> = BTreeMap::new();
        for &slot in &scope.per_image[a] {
            let det = &images[a].detections[slot];
            by_class.entry(det.class.as_str()).or_default().push(det.id);
        }
        for &slot in &scope.per_image[b] {
            let det = &images[b].detections[slot];
            if let Some(class_ids) = by_class.get(det.class.as_str()) {
                for &other in class_ids {
                    pairs.push(CandidatePair::new(other, det.id));
                }
            }
        }
    }

    pairs
}

/// Candidate pairs for one run, with the image-pair count kept for stats.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub image_pairs: usize,
    pub pairs: Vec<CandidatePair>,
}

/// Full generation pass: image pairs from the ball relation, then same-class
/// detection cross products.
pub fn generate(
    dataset: &Dataset,
    index: &SpatialIndex,
    scope: &MatchScope,
    radius_meters: f64,
) -> CandidateSet {
    let img_pairs = image_pairs(index, radius_meters);
    let pairs = detection_pairs(dataset, scope, &img_pairs);
    CandidateSet {
        image_pairs: img_pairs.len(),
        pairs,
    }
}
