//! Oracle interface, vote aggregation and pair evaluation.
//!
//! Matching is the only stage that leaves the process: every candidate pair
//! costs one call per configured oracle. Pairs are independent, so they are
//! evaluated concurrently up to the configured worker limit, and the stage
//! only returns once every verdict is in; the duplicate graph is never
//! built from a partial result set.
//!
//! Failure policy is fail-open toward "distinct": a failing or timed-out
//! oracle contributes a "no match" vote, and a pair whose crops cannot be
//! produced is skipped entirely. Infrastructure trouble can therefore never
//! merge detections that were not positively matched.

use std::collections::{BTreeSet, HashMap};
#[cfg(feature = "parallel")]
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidates::CandidatePair;
use crate::crop::{Crop, CropSource};
use crate::error::{DataWarning, DedupError, Result};
use crate::{Dataset, DedupConfig};

/// Failure of a single oracle call. Never fatal: the call is counted as a
/// "no match" vote and the run continues.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("backend failure: {reason}")]
    Backend { reason: String },
}

/// An external image-matching capability.
///
/// Implementations wrap whatever backend the deployment uses (feature
/// matchers behind an HTTP API, a local model, ...). They are invoked from
/// matching worker threads, hence `Send + Sync`, and are responsible for
/// honoring `timeout`: a call that exceeds it must return
/// [`OracleError::Timeout`] rather than block the stage.
pub trait MatchOracle: Send + Sync {
    /// Short stable name for logs.
    fn name(&self) -> &str;

    /// Number of verified feature matches between the two crops.
    fn match_count(
        &self,
        a: &Crop,
        b: &Crop,
        timeout: Duration,
    ) -> std::result::Result<u64, OracleError>;

    /// The oracle votes "match" iff its count is strictly greater than this.
    fn threshold(&self) -> u64;
}

/// Binary outcome of the majority vote for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Duplicate,
    Distinct,
}

/// One evaluated candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairVerdict {
    pub pair: CandidatePair,
    pub verdict: Verdict,
    /// Oracles whose match count exceeded their threshold.
    pub match_votes: u32,
    /// Oracles that failed or timed out on this pair.
    pub oracle_failures: u32,
}

/// Every verdict of one matching pass. Serializable, so matching and removal
/// can run as separate phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub verdicts: Vec<PairVerdict>,
    /// Pairs dropped before any oracle call because a crop was unavailable.
    #[serde(default)]
    pub skipped_pairs: usize,
}

impl MatchReport {
    pub fn duplicate_pairs(&self) -> impl Iterator<Item = CandidatePair> + '_ {
        self.verdicts
            .iter()
            .filter(|v| v.verdict == Verdict::Duplicate)
            .map(|v| v.pair)
    }

    pub fn duplicate_count(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|v| v.verdict == Verdict::Duplicate)
            .count()
    }

    /// Total failed oracle calls across all pairs.
    pub fn failure_count(&self) -> u64 {
        self.verdicts
            .iter()
            .map(|v| u64::from(v.oracle_failures))
            .sum()
    }
}

/// Cooperative cancellation flag shared between the caller and the matching
/// stage. Cancelling stops new oracle calls from being issued; calls already
/// in flight finish normally, then the run fails with
/// [`DedupError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The matching stage of one run, borrowing everything it needs.
pub struct MatchStage<'a> {
    pub dataset: &'a Dataset,
    pub oracles: &'a [Box<dyn MatchOracle>],
    pub crop_source: &'a dyn CropSource,
    pub config: &'a DedupConfig,
}

impl MatchStage<'_> {
    /// Evaluate every candidate pair and return the full report plus any
    /// crop-related warnings.
    pub fn evaluate(
        &self,
        pairs: &[CandidatePair],
        cancel: &CancelToken,
    ) -> Result<(MatchReport, Vec<DataWarning>)> {
        if self.oracles.is_empty() {
            return Err(DedupError::NoOracles);
        }
        let required = self.config.required_votes(self.oracles.len());

        let (crops, warnings) = self.collect_crops(pairs)?;

        // Pairs with a failed crop never reach an oracle; the per-detection
        // warning above already covers them.
        let mut runnable: Vec<(CandidatePair, &Crop, &Crop)> = Vec::with_capacity(pairs.len());
        let mut skipped_pairs = 0;
        for &pair in pairs {
            match (crops.get(&pair.left), crops.get(&pair.right)) {
                (Some(a), Some(b)) => runnable.push((pair, a, b)),
                _ => skipped_pairs += 1,
            }
        }

        let verdicts = self.collect_verdicts(&runnable, required, cancel)?;

        Ok((
            MatchReport {
                verdicts,
                skipped_pairs,
            },
            warnings,
        ))
    }

    /// Produce (and upscale) one crop per detection appearing in the pair
    /// set. Detections are cropped once, not once per pair.
    fn collect_crops(
        &self,
        pairs: &[CandidatePair],
    ) -> Result<(HashMap<crate::DetectionId, Crop>, Vec<DataWarning>)> {
        let wanted: BTreeSet<crate::DetectionId> =
            pairs.iter().flat_map(|p| [p.left, p.right]).collect();

        let mut crops = HashMap::with_capacity(wanted.len());
        let mut warnings = Vec::new();

        for id in wanted {
            let det = self
                .dataset
                .detection(id)
                .ok_or(DedupError::UnknownDetection { id })?;
            let image = self
                .dataset
                .detection_image(id)
                .ok_or(DedupError::UnknownDetection { id })?;

            match self.crop_source.crop(&image.name, &det.bbox) {
                Ok(crop) => {
                    crops.insert(id, crop.scale_to_min_side(self.config.min_crop_side));
                }
                Err(err) => {
                    let warning = DataWarning::CropFailed {
                        detection: id,
                        reason: err.to_string(),
                    };
                    warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }

        Ok((crops, warnings))
    }

    /// Majority vote over all oracles for one pair.
    fn vote_pair(&self, pair: CandidatePair, a: &Crop, b: &Crop, required: u32) -> PairVerdict {
        let mut match_votes = 0;
        let mut oracle_failures = 0;

        for oracle in self.oracles {
            match oracle.match_count(a, b, self.config.oracle_timeout) {
                Ok(count) if count > oracle.threshold() => match_votes += 1,
                Ok(_) => {}
                Err(err) => {
                    oracle_failures += 1;
                    warn!(
                        "oracle '{}' failed on pair {}: {}",
                        oracle.name(),
                        pair,
                        err
                    );
                }
            }
        }

        let verdict = if match_votes >= required {
            Verdict::Duplicate
        } else {
            Verdict::Distinct
        };
        PairVerdict {
            pair,
            verdict,
            match_votes,
            oracle_failures,
        }
    }

    #[cfg(feature = "parallel")]
    fn collect_verdicts(
        &self,
        runnable: &[(CandidatePair, &Crop, &Crop)],
        required: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<PairVerdict>> {
        use rayon::prelude::*;

        // A one-worker pool is pointless overhead.
        if self.config.concurrency_limit <= 1 {
            return self.collect_verdicts_sequential(runnable, required, cancel);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency_limit)
            .thread_name(|i| format!("geodedup-match-{i}"))
            .build()
            .map_err(|e| DedupError::WorkerPool {
                reason: e.to_string(),
            })?;

        let evaluated = AtomicUsize::new(0);
        let verdicts: Vec<PairVerdict> = pool.install(|| {
            runnable
                .par_iter()
                .map(|(pair, a, b)| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let verdict = self.vote_pair(*pair, a, b, required);
                    evaluated.fetch_add(1, Ordering::Relaxed);
                    Some(verdict)
                })
                .while_some()
                .collect()
        });

        if cancel.is_cancelled() {
            return Err(DedupError::Cancelled {
                evaluated: evaluated.load(Ordering::Relaxed),
                total: runnable.len(),
            });
        }
        Ok(verdicts)
    }

    #[cfg(not(feature = "parallel"))]
    fn collect_verdicts(
        &self,
        runnable: &[(CandidatePair, &Crop, &Crop)],
        required: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<PairVerdict>> {
        self.collect_verdicts_sequential(runnable, required, cancel)
    }

    fn collect_verdicts_sequential(
        &self,
        runnable: &[(CandidatePair, &Crop, &Crop)],
        required: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<PairVerdict>> {
        let mut verdicts = Vec::with_capacity(runnable.len());
        for (pair, a, b) in runnable {
            if cancel.is_cancelled() {
                return Err(DedupError::Cancelled {
                    evaluated: verdicts.len(),
                    total: runnable.len(),
                });
            }
            verdicts.push(self.vote_pair(*pair, a, b, required));
        }
        Ok(verdicts)
    }
}
