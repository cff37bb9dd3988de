//! Run statistics produced by the generation and curation stages.

use serde::{Deserialize, Serialize};

use crate::types::ScoredItem;

/// A chunk or judge batch that was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    /// Chunk index (generation) or batch index (curation).
    pub index: usize,
    /// How many calls were made before giving up.
    pub attempts: u32,
    pub reason: String,
}

/// Statistics from one accumulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Target item count.
    pub requested: usize,
    /// Items kept after de-duplication.
    pub generated: usize,
    pub chunks_total: usize,
    /// Chunks for which the generator was called (including skipped ones).
    pub chunks_processed: usize,
    pub duplicates: usize,
    #[serde(default)]
    pub skipped: Vec<SkippedUnit>,
    /// Chunks ran out before the target was met.
    pub under_generated: bool,
    pub cancelled: bool,
}

/// Statistics from one curation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationReport {
    pub total: usize,
    /// Items that received a usable score.
    pub evaluated: usize,
    pub passed: usize,
    pub below_threshold: usize,
    /// Items in successful batches whose score was absent or invalid.
    pub missing_score: usize,
    #[serde(default)]
    pub failed_batches: Vec<SkippedUnit>,
    /// Items dropped because their whole batch failed.
    pub excluded_by_batch_failure: usize,
    /// Mean of the usable scores, `0.0` when nothing was scored.
    pub average_score: f64,
    pub threshold: f64,
    pub cancelled: bool,
}

impl CurationReport {
    /// Items that did not make it into the kept dataset.
    pub fn excluded(&self) -> usize {
        self.total - self.passed
    }
}

/// Statistics from one chain-of-thought enhancement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhanceReport {
    /// Conversations considered, after any limit.
    pub total: usize,
    pub enhanced: usize,
    /// Conversations written back unchanged because the model call failed.
    #[serde(default)]
    pub kept_original: Vec<SkippedUnit>,
    pub cancelled: bool,
}

/// Curation report plus every item with its verdict, persisted next to the
/// kept items so a run can be audited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationAudit {
    pub report: CurationReport,
    pub scored: Vec<ScoredItem>,
}
