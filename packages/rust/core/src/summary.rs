//! Rolling summarization for documents longer than one chunk.
//!
//! Each chunk is summarized on its own, the partial summaries are joined and
//! the join is summarized again. Rounds repeat while the join is still longer
//! than a chunk; the last round is always a single call.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use synthkit_shared::{Chunk, Dataset, GenerationReport, ItemBody, ItemKind, Result};

use crate::accumulator::{AccumulateOutcome, Accumulator, ChunkGenerator};
use crate::chunker::Chunker;
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;

/// Partial-summary rounds before the join is summarized as-is.
const MAX_ROUNDS: usize = 4;

/// Summarizes a document of any length into a single summary item.
#[derive(Debug, Clone)]
pub struct RollingSummarizer {
    chunker: Chunker,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RollingSummarizer {
    pub fn new(chunker: Chunker, retry: RetryPolicy) -> Self {
        Self {
            chunker,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `generator` must produce [`ItemKind::Summary`] items. The report
    /// totals cover every round; skipped units keep their per-round chunk
    /// index.
    #[instrument(skip_all, fields(source = %source, chars = text.chars().count()))]
    pub async fn run<G: ChunkGenerator>(
        &self,
        generator: &G,
        source: &str,
        text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<AccumulateOutcome> {
        let mut report = GenerationReport {
            requested: 1,
            ..Default::default()
        };
        let mut current = text.to_string();

        for round in 0..MAX_ROUNDS {
            let len = current.chars().count();
            if len <= self.chunker.chunk_size() {
                break;
            }
            let chunks: Vec<Chunk> = self.chunker.chunks(&current).collect();
            let partial = self.round(generator, source, chunks, progress).await?;
            merge(&mut report, &partial.report);
            if partial.report.cancelled || partial.dataset.is_empty() {
                // Partial summaries are not a summary of the document.
                warn!(round, cancelled = partial.report.cancelled, "stopping before the final summary");
                return Ok(finish(Dataset::new(ItemKind::Summary, source), report));
            }

            let joined = partial
                .dataset
                .items()
                .iter()
                .filter_map(|item| match &item.body {
                    ItemBody::Summary { text } => Some(text.trim()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            info!(
                round,
                partials = partial.dataset.len(),
                from_chars = len,
                to_chars = joined.chars().count(),
                "reduced partial summaries"
            );
            current = joined;
        }

        let whole = Chunk {
            index: 0,
            start: 0,
            end: current.chars().count(),
            text: current,
        };
        let last = self.round(generator, source, vec![whole], progress).await?;
        merge(&mut report, &last.report);
        Ok(finish(last.dataset, report))
    }

    async fn round<G: ChunkGenerator>(
        &self,
        generator: &G,
        source: &str,
        chunks: Vec<Chunk>,
        progress: &dyn ProgressReporter,
    ) -> Result<AccumulateOutcome> {
        // One summary per chunk.
        let target = chunks.len();
        Accumulator::new(ItemKind::Summary, target, self.retry.clone())
            .with_cancel(self.cancel.clone())
            .run(generator, source, chunks.into_iter(), progress)
            .await
    }
}

fn merge(total: &mut GenerationReport, round: &GenerationReport) {
    total.chunks_total += round.chunks_total;
    total.chunks_processed += round.chunks_processed;
    total.duplicates += round.duplicates;
    total.skipped.extend(round.skipped.iter().cloned());
    total.cancelled |= round.cancelled;
}

fn finish(dataset: Dataset, mut report: GenerationReport) -> AccumulateOutcome {
    report.generated = dataset.len();
    report.under_generated = dataset.is_empty() && !report.cancelled;
    AccumulateOutcome { dataset, report }
}
