//! # geodedup
//!
//! Geo-duplicate resolution for object detections in street-level imagery.
//!
//! The same physical storefront is typically photographed from several nearby
//! camera positions, so a detection dataset built from street imagery is full
//! of repeated observations of one real object. This library finds those
//! repeats and keeps exactly one detection per physical object:
//!
//! 1. **Spatial index**: an R-tree over image positions answers "which
//!    images lie within R meters of this one" (the image's neighborhood ball).
//! 2. **Candidate generation**: every unordered pair of mutually neighboring
//!    images yields the cross product of their same-class detections.
//! 3. **Pairwise matching**: each candidate pair is cropped and submitted to
//!    N independent matching oracles; a majority vote turns per-oracle match
//!    counts into a duplicate/distinct verdict. A failing oracle counts as
//!    "no match", so infrastructure errors can never over-merge.
//! 4. **Duplicate graph**: duplicate verdicts are edges; union-find extracts
//!    connected components, each interpreted as one physical object.
//! 5. **Resolution**: one representative per component is kept (uniform
//!    random under a fixed seed), the rest are removed, and images left with
//!    no detections are dropped. A manifest records every removal.
//!
//! ## Features
//!
//! - **`parallel`** (default) - Evaluate candidate pairs on a rayon pool
//! - **`cli`** - Build the `geodedup` debug binary
//!
//! ## Quick Start
//!
//! ```rust
//! use geodedup::synthetic::{color_oracles, SceneOptions, SyntheticScene};
//! use geodedup::{DedupConfig, DedupEngine};
//!
//! let scene = SyntheticScene::generate(&SceneOptions::default());
//! let engine = DedupEngine::new(
//!     DedupConfig::default(),
//!     color_oracles(3),
//!     Box::new(scene.crop_source()),
//! );
//!
//! let outcome = engine.run(scene.dataset.clone()).unwrap();
//! // Each synthetic site was observed several times; one observation survives.
//! assert_eq!(outcome.stats.groups, scene.site_count());
//! assert!(outcome.stats.detections_removed > 0);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Unified error handling
pub mod error;
pub use error::{DataWarning, DedupError, Result};

// Geographic utilities (haversine, meter/degree conversions)
pub mod geo;
pub use geo::haversine_distance;

// Dataset assembly and lookup
pub mod dataset;
pub use dataset::Dataset;

// R-tree neighborhood index over image positions
pub mod spatial;
pub use spatial::{ImagePoint, SpatialIndex};

// Candidate pair generation
pub mod candidates;
pub use candidates::{CandidatePair, MatchScope};

// Detection crops and their retrieval
pub mod crop;
pub use crop::{Crop, CropError, CropSource};

// Oracle interface, vote aggregation, parallel evaluation
pub mod matcher;
pub use matcher::{CancelToken, MatchOracle, MatchReport, OracleError, PairVerdict, Verdict};

// Union-Find data structure for component extraction
pub mod union_find;
pub use union_find::UnionFind;

// Duplicate graph and connected components
pub mod graph;
pub use graph::{connected_components, DuplicateComponent};

// Representative selection and removal manifest
pub mod resolve;
pub use resolve::{ComponentRecord, RemovalManifest, RemovedDetection};

// Run orchestration
pub mod engine;
pub use engine::{DedupEngine, DedupOutcome, RunStats};

// Synthetic scenes for tests, benches and the debug CLI
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in WGS84 degrees.
///
/// # Example
/// ```
/// use geodedup::GeoPoint;
/// let point = GeoPoint::new(35.6895, 139.6917); // Tokyo
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new geographic point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned bounding box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelBox {
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build from the `[x, y, width, height]` convention used by detector
    /// output.
    pub fn from_size(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x.saturating_add(width),
            y_max: y.saturating_add(height),
        }
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    /// Zero-area boxes occasionally come out of the annotation stage; they
    /// cannot be cropped and are excluded from matching.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Process-unique identifier of a detection, stable for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionId(pub u64);

impl std::fmt::Display for DetectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single detected object within one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub id: DetectionId,
    /// Class label from the detector's category set.
    pub class: String,
    /// Bounding box in source-image pixel coordinates.
    pub bbox: PixelBox,
    /// Position estimated by the upstream geolocation stage, when available.
    /// Carried through for downstream consumers; the ball relation itself is
    /// computed over image coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// One captured image and its detections, in annotation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Unique name, typically the source filename.
    pub name: String,
    /// Camera position, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Run-scoped configuration, passed explicitly into every stage.
///
/// There is deliberately no global state: two areas can be deduplicated
/// concurrently in one process with different configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupConfig {
    /// Neighborhood ball radius around each image position (meters).
    pub radius_meters: f64,
    /// Class labels eligible for matching. Empty means every class.
    pub class_filter: Vec<String>,
    /// Oracle votes required for a duplicate verdict. `None` means a strict
    /// majority of the configured oracles (2 of 3 in the usual setup).
    pub vote_threshold: Option<u32>,
    /// Seed for representative selection. Fixed by default so repeated runs
    /// over the same data remove the same detections.
    pub random_seed: u64,
    /// Worker threads for pair matching (the only concurrent stage).
    pub concurrency_limit: usize,
    /// Deadline handed to each oracle call; a timed-out call counts as a
    /// failed one.
    pub oracle_timeout: Duration,
    /// Crops with a shorter side below this are upscaled before matching.
    pub min_crop_side: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            radius_meters: 30.0, // typical spacing between street-view captures
            class_filter: Vec::new(),
            vote_threshold: None, // strict majority
            random_seed: 10,
            concurrency_limit: 8,
            oracle_timeout: Duration::from_secs(30),
            min_crop_side: 100, // keypoint matchers degrade below ~100 px
        }
    }
}

impl DedupConfig {
    /// Votes required for a duplicate verdict with `oracle_count` oracles.
    pub fn required_votes(&self, oracle_count: usize) -> u32 {
        match self.vote_threshold {
            Some(k) => k,
            None => oracle_count as u32 / 2 + 1,
        }
    }

    /// Whether `class` participates in matching under this configuration.
    pub fn class_allowed(&self, class: &str) -> bool {
        self.class_filter.is_empty() || self.class_filter.iter().any(|c| c == class)
    }
}
