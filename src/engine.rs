//! Run orchestration.
//!
//! [`DedupEngine`] wires the stages together for a single run over one
//! area's dataset: eligibility and spatial indexing, candidate generation,
//! pairwise matching, component extraction, resolution. Matching must finish
//! completely before the graph is built; a cancelled or failed matching
//! stage aborts the run without committing anything.

use log::info;
use serde::{Deserialize, Serialize};

use crate::candidates;
use crate::crop::CropSource;
use crate::error::{DataWarning, DedupError, Result};
use crate::graph;
use crate::matcher::{CancelToken, MatchOracle, MatchReport, MatchStage};
use crate::resolve::{self, RemovalManifest};
use crate::spatial::SpatialIndex;
use crate::{Dataset, DedupConfig};

/// Counters describing one run, for logs and sanity checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub images: usize,
    /// Images that entered the spatial index (usable coordinate plus at
    /// least one matchable detection).
    pub images_indexed: usize,
    /// Images excluded from indexing for lack of a usable coordinate.
    pub images_unlocated: usize,
    pub detections: usize,
    pub detections_matchable: usize,
    pub image_pairs: usize,
    pub candidate_pairs: usize,
    pub pairs_evaluated: usize,
    /// Pairs skipped before any oracle call because a crop was unavailable.
    pub pairs_skipped: usize,
    pub duplicate_pairs: usize,
    pub oracle_failures: u64,
    /// Multi-member components (one physical object seen more than once).
    pub groups: usize,
    pub detections_removed: usize,
    pub images_removed: usize,
}

/// Everything one run produces.
#[derive(Debug)]
pub struct DedupOutcome {
    /// The deduplicated dataset.
    pub dataset: Dataset,
    /// Audit manifest of every removal.
    pub manifest: RemovalManifest,
    /// Raw pair verdicts, serializable for two-phase operation.
    pub report: MatchReport,
    pub stats: RunStats,
    /// Data-quality findings collected across all stages.
    pub warnings: Vec<DataWarning>,
}

/// Geo-duplicate resolution engine.
///
/// Owns the oracle set and the crop source; configuration is run-scoped and
/// passed through explicitly, so several engines can operate concurrently in
/// one process.
pub struct DedupEngine {
    config: DedupConfig,
    oracles: Vec<Box<dyn MatchOracle>>,
    crop_source: Box<dyn CropSource>,
}

impl DedupEngine {
    pub fn new(
        config: DedupConfig,
        oracles: Vec<Box<dyn MatchOracle>>,
        crop_source: Box<dyn CropSource>,
    ) -> Self {
        Self {
            config,
            oracles,
            crop_source,
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Deduplicate `dataset`, consuming it as the run's working copy.
    pub fn run(&self, dataset: Dataset) -> Result<DedupOutcome> {
        self.run_with_cancel(dataset, &CancelToken::new())
    }

    /// [`run`](Self::run) with cooperative cancellation. Cancelling stops new
    /// oracle calls, lets in-flight calls finish, and fails the run with
    /// [`DedupError::Cancelled`]; no partial output is produced.
    pub fn run_with_cancel(&self, dataset: Dataset, cancel: &CancelToken) -> Result<DedupOutcome> {
        if dataset.is_empty() {
            return Err(DedupError::EmptyDataset);
        }
        if self.oracles.is_empty() {
            return Err(DedupError::NoOracles);
        }

        let mut warnings = Vec::new();

        // Eligibility and the spatial index.
        let mut scope = candidates::collect_scope(&dataset, &self.config);
        warnings.append(&mut scope.warnings);

        let (points, coord_warnings) = candidates::index_points(&dataset, &scope);
        let images_unlocated = coord_warnings.len();
        warnings.extend(coord_warnings);

        let index = SpatialIndex::build(points);
        info!(
            "indexed {} of {} images ({} matchable detections)",
            index.len(),
            dataset.image_count(),
            scope.matchable
        );

        // Candidate pairs.
        let candidate_set =
            candidates::generate(&dataset, &index, &scope, self.config.radius_meters);
        info!(
            "{} neighboring image pairs yielded {} candidate detection pairs",
            candidate_set.image_pairs,
            candidate_set.pairs.len()
        );

        // Pairwise matching. `evaluate` returns only once every verdict is
        // in, which is the synchronization barrier the graph build relies on.
        let stage = MatchStage {
            dataset: &dataset,
            oracles: &self.oracles,
            crop_source: self.crop_source.as_ref(),
            config: &self.config,
        };
        let (report, crop_warnings) = stage.evaluate(&candidate_set.pairs, cancel)?;
        warnings.extend(crop_warnings);

        // Components and resolution.
        let ids = dataset.detection_ids();
        let components = graph::connected_components(&ids, report.duplicate_pairs())?;
        let (filtered, manifest) =
            resolve::resolve(&dataset, &components, self.config.random_seed)?;

        let stats = RunStats {
            images: dataset.image_count(),
            images_indexed: index.len(),
            images_unlocated,
            detections: dataset.detection_count(),
            detections_matchable: scope.matchable,
            image_pairs: candidate_set.image_pairs,
            candidate_pairs: candidate_set.pairs.len(),
            pairs_evaluated: report.verdicts.len(),
            pairs_skipped: report.skipped_pairs,
            duplicate_pairs: report.duplicate_count(),
            oracle_failures: report.failure_count(),
            groups: manifest.groups.len(),
            detections_removed: manifest.removed_detections.len(),
            images_removed: manifest.removed_images.len(),
        };
        info!(
            "resolved {} groups: removed {} detections, dropped {} empty images",
            stats.groups, stats.detections_removed, stats.images_removed
        );

        Ok(DedupOutcome {
            dataset: filtered,
            manifest,
            report,
            stats,
            warnings,
        })
    }
}
