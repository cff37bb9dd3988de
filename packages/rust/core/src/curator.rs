//! Curation batcher: score items in fixed-size batches and keep those at or
//! above the threshold.
//!
//! A missing or invalid score excludes the item but never fails the run. A
//! batch whose judge call keeps failing is excluded whole and recorded.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use synthkit_shared::{
    CurationReport, CurationSettings, Dataset, GeneratedItem, Result, ScoredItem, SkippedUnit,
    SynthError, validate_threshold,
};

use crate::judge::{Judge, Verdict};
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;

/// Kept items plus the full audit trail.
#[derive(Debug)]
pub struct CurationOutcome {
    pub kept: Dataset,
    /// Every input item in order, with its score when one was obtained.
    pub scored: Vec<ScoredItem>,
    pub report: CurationReport,
}

#[derive(Debug, Clone)]
pub struct Curator {
    threshold: f64,
    batch_size: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Curator {
    /// Fails with a config error if `batch_size` is zero or `threshold` is
    /// not within `[0, 10]`.
    pub fn new(threshold: f64, batch_size: usize, retry: RetryPolicy) -> Result<Self> {
        validate_threshold(threshold)?;
        if batch_size == 0 {
            return Err(SynthError::config("batch_size must be at least 1"));
        }
        Ok(Self {
            threshold,
            batch_size,
            retry,
            cancel: CancellationToken::new(),
        })
    }

    pub fn from_settings(settings: &CurationSettings, retry: RetryPolicy) -> Result<Self> {
        Self::new(settings.threshold, settings.batch_size, retry)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[instrument(skip_all, fields(items = dataset.len(), threshold = self.threshold, batch_size = self.batch_size))]
    pub async fn run<J: Judge>(
        &self,
        judge: &J,
        dataset: Dataset,
        progress: &dyn ProgressReporter,
    ) -> Result<CurationOutcome> {
        let kind = dataset.kind();
        let source = dataset.source().to_string();
        let items = dataset.into_items();

        let mut report = CurationReport {
            total: items.len(),
            threshold: self.threshold,
            ..Default::default()
        };
        let mut scored: Vec<ScoredItem> = Vec::with_capacity(items.len());
        let mut kept: Vec<GeneratedItem> = Vec::new();
        let mut score_sum = 0.0;

        let batches: Vec<&[GeneratedItem]> = items.chunks(self.batch_size).collect();
        let batch_total = batches.len();
        progress.phase("Curating");

        for (batch_index, batch) in batches.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(batch = batch_index, "curation cancelled");
                report.cancelled = true;
                break;
            }

            let outcome = self.retry.run(&self.cancel, || judge.judge(batch)).await;
            let verdicts = match outcome.result {
                Ok(verdicts) => verdicts,
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        batch = batch_index,
                        attempts = outcome.attempts,
                        error = %err,
                        "excluding batch after judge failure"
                    );
                    report.failed_batches.push(SkippedUnit {
                        index: batch_index,
                        attempts: outcome.attempts,
                        reason: err.to_string(),
                    });
                    report.excluded_by_batch_failure += batch.len();
                    scored.extend(batch.iter().map(unscored));
                    progress.unit_done(batch_index + 1, batch_total, "batch failed");
                    if outcome.cancelled {
                        report.cancelled = true;
                        break;
                    }
                    continue;
                }
            };

            let verdicts = align_verdicts(batch_index, batch.len(), verdicts);
            for (item, verdict) in batch.iter().zip(verdicts) {
                let score = verdict.as_ref().and_then(|v| v.score).filter(|s| valid_score(*s));
                let rationale = verdict.and_then(|v| v.rationale);

                match score {
                    Some(score) => {
                        report.evaluated += 1;
                        score_sum += score;
                        if score >= self.threshold {
                            report.passed += 1;
                            kept.push(item.clone());
                        } else {
                            report.below_threshold += 1;
                        }
                    }
                    None => {
                        warn!(batch = batch_index, chunk = item.chunk_index, "item has no usable score, excluding");
                        report.missing_score += 1;
                    }
                }

                scored.push(ScoredItem {
                    item: item.clone(),
                    score,
                    rationale,
                });
            }

            progress.unit_done(
                batch_index + 1,
                batch_total,
                &format!("{} kept", report.passed),
            );
        }

        // Items in batches never reached because of cancellation.
        if scored.len() < items.len() {
            scored.extend(items[scored.len()..].iter().map(unscored));
        }

        report.average_score = if report.evaluated > 0 {
            score_sum / report.evaluated as f64
        } else {
            0.0
        };

        info!(
            total = report.total,
            passed = report.passed,
            below_threshold = report.below_threshold,
            missing = report.missing_score,
            failed_batches = report.failed_batches.len(),
            average = report.average_score,
            "curation finished"
        );
        progress.done(&format!("Kept {} of {} items", report.passed, report.total));

        Ok(CurationOutcome {
            kept: Dataset::from_items(kind, source, kept)?,
            scored,
            report,
        })
    }
}

fn unscored(item: &GeneratedItem) -> ScoredItem {
    ScoredItem {
        item: item.clone(),
        score: None,
        rationale: None,
    }
}

fn valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=10.0).contains(&score)
}

/// One slot per batch item; the first verdict for an index wins and
/// out-of-range indices are dropped.
fn align_verdicts(batch_index: usize, len: usize, verdicts: Vec<Verdict>) -> Vec<Option<Verdict>> {
    let mut slots: Vec<Option<Verdict>> = vec![None; len];
    for verdict in verdicts {
        let Some(slot) = slots.get_mut(verdict.index) else {
            warn!(batch = batch_index, index = verdict.index, len, "verdict index out of range");
            continue;
        };
        if slot.is_some() {
            warn!(batch = batch_index, index = verdict.index, "duplicate verdict ignored");
            continue;
        }
        *slot = Some(verdict);
    }
    slots
}
