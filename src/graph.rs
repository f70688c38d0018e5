//! Duplicate graph and connected components.
//!
//! The graph is implicit: detections are arena indices, duplicate verdicts
//! are union operations, and the components fall out of the union-find
//! forest. No adjacency structure is ever materialized.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candidates::CandidatePair;
use crate::error::{DedupError, Result};
use crate::union_find::UnionFind;
use crate::DetectionId;

/// One maximal set of detections transitively linked by duplicate verdicts,
/// interpreted as one physical object observed multiple times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateComponent {
    /// Position in the deterministic component order (components are sorted
    /// by their smallest member id).
    pub id: u32,
    /// Member detection ids, ascending. Never empty.
    pub members: Vec<DetectionId>,
}

impl DuplicateComponent {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Connected components over `detections`, with one undirected edge per
/// duplicate verdict. Singletons are included: a detection with no duplicate
/// verdicts forms its own component.
///
/// Output depends only on the edge set: inserting the same edges in any
/// order yields identical components in identical order.
///
/// Errors when an edge references an id outside `detections`, which happens
/// when a persisted match report is replayed against the wrong dataset.
pub fn connected_components(
    detections: &[DetectionId],
    edges: impl IntoIterator<Item = CandidatePair>,
) -> Result<Vec<DuplicateComponent>> {
    let mut ids: Vec<DetectionId> = detections.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let index_of: HashMap<DetectionId, usize> =
        ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut uf = UnionFind::new(ids.len());
    for edge in edges {
        let &left = index_of
            .get(&edge.left)
            .ok_or(DedupError::UnknownDetection { id: edge.left })?;
        let &right = index_of
            .get(&edge.right)
            .ok_or(DedupError::UnknownDetection { id: edge.right })?;
        uf.union(left, right);
    }

    let components = uf
        .groups()
        .into_iter()
        .enumerate()
        .map(|(i, members)| DuplicateComponent {
            id: i as u32,
            members: members.into_iter().map(|idx| ids[idx]).collect(),
        })
        .collect();

    Ok(components)
}
