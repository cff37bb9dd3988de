//! Generation accumulator.
//!
//! Walks chunks in order, asks a [`ChunkGenerator`] for items from each one
//! and stops as soon as the target count is reached. A chunk's batch is kept
//! whole even when it overshoots the target. Failed chunks are retried per
//! the [`RetryPolicy`], then skipped and recorded; only run-fatal errors
//! abort.

use std::collections::HashSet;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use synthkit_shared::{
    Chunk, Dataset, GeneratedItem, GenerationReport, ItemBody, ItemKind, Result, SkippedUnit,
};

use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;

/// Produces candidate items from a single chunk.
pub trait ChunkGenerator: Send + Sync {
    fn generate(&self, chunk: &Chunk) -> impl Future<Output = Result<Vec<ItemBody>>> + Send;
}

impl<G: ChunkGenerator> ChunkGenerator for &G {
    fn generate(&self, chunk: &Chunk) -> impl Future<Output = Result<Vec<ItemBody>>> + Send {
        (**self).generate(chunk)
    }
}

/// Accumulated dataset plus run statistics.
#[derive(Debug)]
pub struct AccumulateOutcome {
    pub dataset: Dataset,
    pub report: GenerationReport,
}

/// Collects items across chunks until `target` is met.
#[derive(Debug, Clone)]
pub struct Accumulator {
    kind: ItemKind,
    target: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Accumulator {
    pub fn new(kind: ItemKind, target: usize, retry: RetryPolicy) -> Self {
        Self {
            kind,
            target,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `cancel` between chunks.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[instrument(skip_all, fields(kind = %self.kind, target = self.target))]
    pub async fn run<G, I>(
        &self,
        generator: &G,
        source: &str,
        chunks: I,
        progress: &dyn ProgressReporter,
    ) -> Result<AccumulateOutcome>
    where
        G: ChunkGenerator,
        I: ExactSizeIterator<Item = Chunk>,
    {
        let mut dataset = Dataset::new(self.kind, source);
        let mut seen: HashSet<String> = HashSet::new();
        let mut report = GenerationReport {
            requested: self.target,
            chunks_total: chunks.len(),
            ..Default::default()
        };

        progress.phase("Generating");

        for chunk in chunks {
            if dataset.len() >= self.target {
                break;
            }
            if self.cancel.is_cancelled() {
                warn!(chunk = chunk.index, "generation cancelled");
                report.cancelled = true;
                break;
            }

            report.chunks_processed += 1;
            let outcome = self.retry.run(&self.cancel, || generator.generate(&chunk)).await;

            match outcome.result {
                Ok(bodies) => {
                    let returned = bodies.len();
                    let mut added = 0;
                    for body in bodies {
                        if body.kind() != self.kind {
                            debug!(chunk = chunk.index, got = %body.kind(), "dropping item of another kind");
                            continue;
                        }
                        if !seen.insert(body.fingerprint()) {
                            report.duplicates += 1;
                            continue;
                        }
                        dataset.push(GeneratedItem::new(chunk.index, body))?;
                        added += 1;
                    }
                    debug!(chunk = chunk.index, returned, added, total = dataset.len(), "chunk done");
                }
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        chunk = chunk.index,
                        attempts = outcome.attempts,
                        error = %err,
                        "skipping chunk"
                    );
                    report.skipped.push(SkippedUnit {
                        index: chunk.index,
                        attempts: outcome.attempts,
                        reason: err.to_string(),
                    });
                    if outcome.cancelled {
                        warn!(chunk = chunk.index, "generation cancelled during retry");
                        report.cancelled = true;
                        break;
                    }
                }
            }

            progress.unit_done(
                report.chunks_processed,
                report.chunks_total,
                &format!("{}/{} items", dataset.len(), self.target),
            );
        }

        report.generated = dataset.len();
        report.under_generated = dataset.len() < self.target && !report.cancelled;

        if report.under_generated {
            warn!(
                generated = report.generated,
                requested = report.requested,
                "chunks exhausted before reaching the target"
            );
        }
        info!(
            generated = report.generated,
            chunks = report.chunks_processed,
            duplicates = report.duplicates,
            skipped = report.skipped.len(),
            "generation finished"
        );
        progress.done(&format!("Generated {} {} items", report.generated, self.kind));

        Ok(AccumulateOutcome { dataset, report })
    }
}
