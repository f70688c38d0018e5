//! Representative selection and removal.
//!
//! Each connected component collapses to one surviving detection. The
//! surviving member is drawn uniformly from a generator seeded with the run
//! seed; components are visited in their deterministic order, so the same
//! seed over the same membership always keeps the same detections. Nothing
//! smarter than uniform random is attempted; the observations in a
//! component are interchangeable views of one object.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DedupError, Result};
use crate::graph::DuplicateComponent;
use crate::{Dataset, DetectionId};

/// A resolved multi-member component: who was kept, who it subsumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub id: u32,
    pub representative: DetectionId,
    /// All members including the representative, ascending.
    pub members: Vec<DetectionId>,
}

/// One removed detection, mapped to the component and representative that
/// subsumed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedDetection {
    pub detection: DetectionId,
    /// Image the detection was removed from.
    pub image: String,
    pub component: u32,
    pub representative: DetectionId,
}

/// Audit record of everything one run removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalManifest {
    /// Seed used for representative selection.
    pub seed: u64,
    /// Multi-member components in component order. Singletons are trivially
    /// kept and not recorded.
    pub groups: Vec<ComponentRecord>,
    pub removed_detections: Vec<RemovedDetection>,
    /// Images dropped because removal left them without detections.
    pub removed_images: Vec<String>,
}

impl RemovalManifest {
    /// Ids of all removed detections.
    pub fn removed_ids(&self) -> HashSet<DetectionId> {
        self.removed_detections
            .iter()
            .map(|r| r.detection)
            .collect()
    }
}

/// Pick one representative per multi-member component. Singletons keep their
/// only member without consuming randomness, mirroring how upstream tooling
/// only ever drew for real groups.
pub fn select_representatives(
    components: &[DuplicateComponent],
    seed: u64,
) -> Vec<ComponentRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for component in components {
        if component.members.len() < 2 {
            continue;
        }
        let pick = rng.gen_range(0..component.members.len());
        records.push(ComponentRecord {
            id: component.id,
            representative: component.members[pick],
            members: component.members.clone(),
        });
    }

    records
}

/// Apply selections: drop every non-representative member, then drop images
/// the removal left without detections.
///
/// Errors when a record references a detection missing from the dataset.
pub fn apply(
    dataset: &Dataset,
    records: Vec<ComponentRecord>,
    seed: u64,
) -> Result<(Dataset, RemovalManifest)> {
    let mut removed_detections = Vec::new();
    let mut removed_ids = HashSet::new();

    for record in &records {
        for &member in &record.members {
            if member == record.representative {
                continue;
            }
            let image = dataset
                .detection_image(member)
                .ok_or(DedupError::UnknownDetection { id: member })?;
            removed_ids.insert(member);
            removed_detections.push(RemovedDetection {
                detection: member,
                image: image.name.clone(),
                component: record.id,
                representative: record.representative,
            });
        }
    }

    let (filtered, removed_images) = dataset.remove_detections(&removed_ids);
    let manifest = RemovalManifest {
        seed,
        groups: records,
        removed_detections,
        removed_images,
    };
    Ok((filtered, manifest))
}

/// Select and apply in one step.
pub fn resolve(
    dataset: &Dataset,
    components: &[DuplicateComponent],
    seed: u64,
) -> Result<(Dataset, RemovalManifest)> {
    let records = select_representatives(components, seed);
    apply(dataset, records, seed)
}
