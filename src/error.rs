//! Error and warning types.
//!
//! Only structurally invalid input or an explicit cancellation aborts a run.
//! Everything else (missing coordinates, unknown image references, degenerate
//! boxes, failing oracles) degrades to a [`DataWarning`] that is collected
//! and logged while the run continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DetectionId;

/// Result type for deduplication operations.
pub type Result<T> = std::result::Result<T, DedupError>;

/// Fatal errors for a deduplication run.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The input dataset contains no images at all.
    #[error("dataset contains no images")]
    EmptyDataset,

    /// Two images in the input share the same name.
    #[error("duplicate image name '{name}' in input")]
    DuplicateImage { name: String },

    /// Two detections in the input share the same id.
    #[error("duplicate detection id {id} in input")]
    DuplicateDetection { id: DetectionId },

    /// No matching oracles were configured; every pair would trivially
    /// resolve to distinct, which is almost certainly a misconfiguration.
    #[error("no matching oracles configured")]
    NoOracles,

    /// A duplicate edge references a detection id that is not in the dataset.
    /// Happens when a persisted match report is replayed against a different
    /// dataset than the one it was computed from.
    #[error("match report references unknown detection id {id}")]
    UnknownDetection { id: DetectionId },

    /// The matching stage could not spawn its worker pool.
    #[error("failed to start matching workers: {reason}")]
    WorkerPool { reason: String },

    /// The run was cancelled while matching. In-flight oracle calls were
    /// allowed to finish; no partial graph was committed.
    #[error("run cancelled after {evaluated} of {total} candidate pairs")]
    Cancelled { evaluated: usize, total: usize },
}

/// Non-fatal data-quality findings, reported alongside the run output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DataWarning {
    /// Image has no usable geographic coordinate and was excluded from
    /// spatial indexing. Its detections are never candidates for removal.
    MissingCoordinate { image: String },

    /// Detection referenced an image name absent from the dataset and was
    /// dropped during assembly.
    UnknownImage { detection: DetectionId, image: String },

    /// Detection has a zero-width or zero-height box (an upstream annotation
    /// mistake) and was excluded from matching.
    DegenerateBox { detection: DetectionId, image: String },

    /// The crop source could not produce this detection's crop; every pair
    /// touching it was skipped as distinct.
    CropFailed { detection: DetectionId, reason: String },
}

impl std::fmt::Display for DataWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataWarning::MissingCoordinate { image } => {
                write!(f, "image '{image}' has no usable coordinate")
            }
            DataWarning::UnknownImage { detection, image } => {
                write!(f, "detection {detection} references unknown image '{image}'")
            }
            DataWarning::DegenerateBox { detection, image } => {
                write!(f, "detection {detection} on '{image}' has a degenerate box")
            }
            DataWarning::CropFailed { detection, reason } => {
                write!(f, "crop for detection {detection} failed: {reason}")
            }
        }
    }
}
