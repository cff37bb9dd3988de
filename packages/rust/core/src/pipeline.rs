//! Stage orchestration: ingest → create → curate → save-as, plus cot-enhance.
//!
//! Stages communicate only through files. Each one reads its input path,
//! writes its output path and returns a summary; [`Pipeline::run`] chains all
//! four for a single source.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use synthkit_formats::{FormatOptions, OutputFormat, serialize, write_atomic, write_json};
use synthkit_ingest::IngestOptions;
use synthkit_provider::ChatClient;
use synthkit_shared::{
    CurationAudit, CurationReport, DatasetFile, Document, EnhanceReport, GenerationReport, ItemKind,
    Result, Settings, SynthError,
};

use crate::accumulator::Accumulator;
use crate::chunker::Chunker;
use crate::curator::Curator;
use crate::enhancer::{CotEnhancer, LlmEnhancer};
use crate::generator::{LlmGenerator, items_per_chunk};
use crate::judge::LlmJudge;
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;
use crate::summary::RollingSummarizer;

/// Output of the `create` stage.
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub path: PathBuf,
    pub report: GenerationReport,
}

/// Output of the `cot-enhance` stage.
#[derive(Debug, Clone)]
pub struct EnhanceResult {
    pub path: PathBuf,
    pub report: EnhanceReport,
}

/// Output of the `curate` stage.
#[derive(Debug, Clone)]
pub struct CurateResult {
    pub path: PathBuf,
    pub report: CurationReport,
}

/// Everything a full `run` produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub parsed: PathBuf,
    pub generated: PathBuf,
    pub curated: PathBuf,
    pub output: PathBuf,
    pub generation: GenerationReport,
    pub curation: CurationReport,
    pub elapsed: Duration,
}

/// Per-stage overrides that take precedence over [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub kind: Option<ItemKind>,
    pub num_items: Option<usize>,
    pub threshold: Option<f64>,
    pub format: Option<OutputFormat>,
    pub name: Option<String>,
}

/// Stage runner bound to one settings snapshot and one chat client.
pub struct Pipeline<C> {
    settings: Settings,
    client: C,
    retry: RetryPolicy,
    cancel: CancellationToken,
    ingest: IngestOptions,
    formats: FormatOptions,
}

impl<C: ChatClient> Pipeline<C> {
    pub fn new(settings: Settings, client: C) -> Self {
        let retry = RetryPolicy::from(&settings.retry);
        Self {
            settings,
            client,
            retry,
            cancel: CancellationToken::new(),
            ingest: IngestOptions::default(),
            formats: FormatOptions::default(),
        }
    }

    /// Stages stop between units once `cancel` is raised.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // ingest
    // -----------------------------------------------------------------------

    /// Parse a file or URL to plain text at `<out_dir>/<stem>.txt`.
    pub async fn ingest(&self, source: &str, out_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        ingest_source(source, out_dir, name, &self.ingest).await
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    /// Generate a dataset of `kind` from a parsed text file into
    /// `<out_dir>/<stem>_<suffix>.json`.
    #[instrument(skip_all, fields(input = %input.display(), kind = %kind))]
    pub async fn create(
        &self,
        input: &Path,
        out_dir: &Path,
        kind: ItemKind,
        num_items: Option<usize>,
        progress: &dyn ProgressReporter,
    ) -> Result<CreateResult> {
        let text = std::fs::read_to_string(input).map_err(|e| SynthError::io(input, e))?;
        if text.trim().is_empty() {
            return Err(SynthError::validation(format!(
                "{}: document is empty",
                input.display()
            )));
        }
        let doc = Document::new(input.display().to_string(), text);

        let generation = &self.settings.generation;
        let target = num_items.unwrap_or(match kind {
            ItemKind::Qa | ItemKind::Conversation => generation.num_pairs,
            ItemKind::Cot => generation.num_cot_examples,
            ItemKind::Summary => 1,
        });

        let chunker = Chunker::from_settings(generation)?;
        let generator = LlmGenerator::new(&self.client, kind, generation, &self.settings.prompts)?;

        let outcome = if kind == ItemKind::Summary {
            info!(chars = doc.char_len(), chunk_size = chunker.chunk_size(), "summarizing");
            RollingSummarizer::new(chunker, self.retry.clone())
                .with_cancel(self.cancel.clone())
                .run(&generator, doc.source(), doc.text(), progress)
                .await?
        } else {
            let chunks = chunker.chunks(doc.text());
            info!(chars = doc.char_len(), chunks = chunks.len(), target, "generating");
            let generator = generator.with_items_per_chunk(items_per_chunk(target, chunks.len()));
            Accumulator::new(kind, target, self.retry.clone())
                .with_cancel(self.cancel.clone())
                .run(&generator, doc.source(), chunks, progress)
                .await?
        };

        let mut file = DatasetFile::new(outcome.dataset);
        file.generation = Some(outcome.report.clone());

        let path = out_dir.join(format!("{}_{}.json", file_stem(input)?, kind.file_suffix()));
        write_json(&path, &file)?;
        info!(path = %path.display(), items = file.items.len(), "dataset written");

        Ok(CreateResult {
            path,
            report: outcome.report,
        })
    }

    // -----------------------------------------------------------------------
    // curate
    // -----------------------------------------------------------------------

    /// Score a dataset file and keep items at or above the threshold. Writes
    /// to `output`, or `<curated>/<stem>_cleaned.json`.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn curate(
        &self,
        input: &Path,
        output: Option<&Path>,
        threshold: Option<f64>,
        progress: &dyn ProgressReporter,
    ) -> Result<CurateResult> {
        let original = read_dataset_file(input)?;
        let generation = original.generation.clone();
        let dataset = original.into_dataset()?;

        let curation = &self.settings.curation;
        let curator = Curator::new(
            threshold.unwrap_or(curation.threshold),
            curation.batch_size,
            self.retry.clone(),
        )?
        .with_cancel(self.cancel.clone());
        let judge = LlmJudge::new(&self.client, curation, &self.settings.prompts)?;

        let outcome = curator.run(&judge, dataset, progress).await?;

        let mut file = DatasetFile::new(outcome.kept);
        file.generation = generation;
        file.curation = Some(CurationAudit {
            report: outcome.report.clone(),
            scored: outcome.scored,
        });

        let path = match output {
            Some(path) => path.to_path_buf(),
            None => self
                .settings
                .paths
                .curated
                .join(format!("{}_cleaned.json", file_stem(input)?)),
        };
        write_json(&path, &file)?;
        info!(path = %path.display(), kept = file.items.len(), "curated dataset written");

        Ok(CurateResult {
            path,
            report: outcome.report,
        })
    }

    // -----------------------------------------------------------------------
    // save-as
    // -----------------------------------------------------------------------

    /// Convert a dataset file into a fine-tuning format. Writes to `output`,
    /// or `<final>/<stem>_<format>.<ext>`.
    pub fn save_as(&self, input: &Path, format: OutputFormat, output: Option<&Path>) -> Result<PathBuf> {
        save_dataset(input, format, output, &self.settings.paths.final_dir, &self.formats)
    }

    // -----------------------------------------------------------------------
    // cot-enhance
    // -----------------------------------------------------------------------

    /// Add step-by-step reasoning to the conversations (or QA pairs) of a
    /// dataset file, writing `<out_dir>/<stem>_enhanced.json`. `limit`
    /// falls back to `generation.num_cot_enhance_examples`.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn enhance(
        &self,
        input: &Path,
        out_dir: &Path,
        limit: Option<usize>,
        progress: &dyn ProgressReporter,
    ) -> Result<EnhanceResult> {
        let original = read_dataset_file(input)?;
        let generation = original.generation.clone();
        let dataset = original.into_dataset()?;

        let settings = &self.settings.generation;
        let enhancer = LlmEnhancer::new(&self.client, settings, &self.settings.prompts)?;
        let outcome = CotEnhancer::new(self.retry.clone())
            .with_cancel(self.cancel.clone())
            .with_limit(limit.or(settings.num_cot_enhance_examples))
            .run(&enhancer, dataset, progress)
            .await?;

        let mut file = DatasetFile::new(outcome.dataset);
        file.generation = generation;
        file.enhancement = Some(outcome.report.clone());

        let path = out_dir.join(format!("{}_enhanced.json", file_stem(input)?));
        write_json(&path, &file)?;
        info!(path = %path.display(), items = file.items.len(), "enhanced dataset written");

        Ok(EnhanceResult {
            path,
            report: outcome.report,
        })
    }

    // -----------------------------------------------------------------------
    // run
    // -----------------------------------------------------------------------

    /// All four stages for one source, using the configured directories.
    /// A cancelled stage still writes its partial output, then the run stops
    /// with [`SynthError::Cancelled`].
    #[instrument(skip_all, fields(source = %source))]
    pub async fn run(&self, source: &str, opts: &RunOptions, progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();
        let paths = &self.settings.paths;
        let kind = opts.kind.unwrap_or(ItemKind::Qa);
        let format = match opts.format {
            Some(format) => format,
            None => self.settings.default_format.parse()?,
        };

        progress.phase("Ingesting");
        let parsed = self.ingest(source, &paths.parsed, opts.name.as_deref()).await?;

        let created = self
            .create(&parsed, &paths.generated, kind, opts.num_items, progress)
            .await?;
        if created.report.cancelled {
            return Err(SynthError::Cancelled);
        }

        let curated = self.curate(&created.path, None, opts.threshold, progress).await?;
        if curated.report.cancelled {
            return Err(SynthError::Cancelled);
        }

        progress.phase("Saving");
        let output = self.save_as(&curated.path, format, None)?;

        let report = RunReport {
            parsed,
            generated: created.path,
            curated: curated.path,
            output,
            generation: created.report,
            curation: curated.report,
            elapsed: start.elapsed(),
        };
        info!(
            output = %report.output.display(),
            generated = report.generation.generated,
            kept = report.curation.passed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&format!("Wrote {}", report.output.display()));
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Stages that never call a model
// ---------------------------------------------------------------------------

/// Parse a file or URL to plain text at `<out_dir>/<stem>.txt`.
#[instrument(skip_all, fields(source = %source))]
pub async fn ingest_source(
    source: &str,
    out_dir: &Path,
    name: Option<&str>,
    opts: &IngestOptions,
) -> Result<PathBuf> {
    let doc = synthkit_ingest::parse(source, opts).await?;
    let stem = name
        .map(str::to_string)
        .unwrap_or_else(|| synthkit_ingest::output_stem(source));
    let path = out_dir.join(format!("{stem}.txt"));

    write_atomic(&path, doc.text())?;
    info!(path = %path.display(), chars = doc.char_len(), "document ingested");
    Ok(path)
}

/// Convert a dataset file into a fine-tuning format. Writes to `output`, or
/// `<final_dir>/<stem>_<format>.<ext>`.
#[instrument(skip_all, fields(input = %input.display(), format = %format))]
pub fn save_dataset(
    input: &Path,
    format: OutputFormat,
    output: Option<&Path>,
    final_dir: &Path,
    opts: &FormatOptions,
) -> Result<PathBuf> {
    let dataset = read_dataset_file(input)?.into_dataset()?;
    let rendered = serialize(&dataset, format, opts)?;

    let path = match output {
        Some(path) => path.to_path_buf(),
        None => final_dir.join(format!(
            "{}_{}.{}",
            file_stem(input)?,
            format,
            format.extension()
        )),
    };
    write_atomic(&path, &rendered)?;
    info!(path = %path.display(), records = dataset.len(), "dataset exported");
    Ok(path)
}

// ---------------------------------------------------------------------------
// Directory batches
// ---------------------------------------------------------------------------

/// Outcome of applying one stage to every supported file in a directory.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub outputs: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Record one file's result. Run-fatal errors other than per-file
    /// problems are handed back so the caller can stop.
    pub fn record(&mut self, input: &Path, result: Result<PathBuf>) -> Result<()> {
        match result {
            Ok(path) => {
                self.outputs.push(path);
                Ok(())
            }
            Err(err @ (SynthError::Config { .. } | SynthError::Cancelled)) => Err(err),
            Err(err) => {
                warn!(input = %input.display(), error = %err, "file failed, continuing");
                self.errors.push((input.to_path_buf(), err.to_string()));
                Ok(())
            }
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outputs.len()
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_dataset_file(path: &Path) -> Result<DatasetFile> {
    let json = std::fs::read_to_string(path).map_err(|e| SynthError::io(path, e))?;
    DatasetFile::from_json_str(&json, &path.display().to_string())
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| SynthError::validation(format!("cannot derive a name from {}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use synthkit_provider::{ChatMessage, CompletionOptions};
    use synthkit_shared::{AppConfig, Dataset, ItemBody};

    use super::*;
    use crate::progress::SilentProgress;

    /// Answers generation prompts with QA JSON and rating prompts with scores.
    struct FakeModel {
        generation_replies: Mutex<VecDeque<String>>,
        rating_reply: String,
    }

    impl FakeModel {
        fn new(generation_replies: &[&str], rating_reply: &str) -> Self {
            Self {
                generation_replies: Mutex::new(generation_replies.iter().map(|s| s.to_string()).collect()),
                rating_reply: rating_reply.to_string(),
            }
        }
    }

    impl ChatClient for FakeModel {
        async fn chat(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String> {
            let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            if prompt.contains("EXAMPLES:") {
                return Ok(self.rating_reply.clone());
            }
            self.generation_replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SynthError::Provider("no more replies".into()))
        }
    }

    fn settings(root: &Path) -> Settings {
        let mut config = AppConfig::default();
        config.paths.parsed = root.join("parsed").display().to_string();
        config.paths.generated = root.join("generated").display().to_string();
        config.paths.curated = root.join("curated").display().to_string();
        config.paths.final_dir = root.join("final").display().to_string();
        config.generation.chunk_size = 40;
        config.generation.overlap = 5;
        config.generation.num_pairs = 3;
        config.retry.max_attempts = 1;
        Settings::from_config(&config).unwrap()
    }

    fn fresh_dir(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    const QA_REPLY: &str = r#"[
        {"question": "What does SynthKit build?", "answer": "Datasets"},
        {"question": "What does it read?", "answer": "Documents"},
        {"question": "What judges quality?", "answer": "An LLM"}
    ]"#;

    const RATING_REPLY: &str = r#"[{"index": 0, "score": 9}, {"index": 1, "score": 4}, {"index": 2, "score": 7}]"#;

    #[tokio::test]
    async fn full_run_writes_every_stage() {
        let tmp = fresh_dir("sk_test_pipeline_run");
        let source = tmp.join("notes.md");
        std::fs::write(&source, "# Notes\n\nSynthKit turns documents into training data.\n").unwrap();

        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&[QA_REPLY], RATING_REPLY));
        let opts = RunOptions {
            format: Some(OutputFormat::Alpaca),
            ..Default::default()
        };
        let report = pipeline
            .run(&source.display().to_string(), &opts, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.parsed, tmp.join("parsed/notes.txt"));
        assert_eq!(report.generated, tmp.join("generated/notes_qa_pairs.json"));
        assert_eq!(report.curated, tmp.join("curated/notes_qa_pairs_cleaned.json"));
        assert_eq!(report.output, tmp.join("final/notes_qa_pairs_cleaned_alpaca.json"));

        assert_eq!(report.generation.generated, 3);
        assert_eq!(report.curation.passed, 2);

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&report.output).unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["instruction"], "What does SynthKit build?");

        let curated = DatasetFile::from_json_str(
            &std::fs::read_to_string(&report.curated).unwrap(),
            "curated",
        )
        .unwrap();
        let audit = curated.curation.unwrap();
        assert_eq!(audit.scored.len(), 3);
        assert!(curated.generation.is_some());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn create_rejects_empty_documents() {
        let tmp = fresh_dir("sk_test_pipeline_empty");
        let input = tmp.join("blank.txt");
        std::fs::write(&input, "  \n\n ").unwrap();

        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&[], RATING_REPLY));
        let err = pipeline
            .create(&input, &tmp, ItemKind::Qa, None, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthError::Validation { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn create_reports_skipped_chunks_and_under_generation() {
        let tmp = fresh_dir("sk_test_pipeline_skips");
        let input = tmp.join("doc.txt");
        std::fs::write(&input, "x".repeat(100)).unwrap();

        let replies = [r#"[{"question": "One?", "answer": "1"}]"#, "not json at all"];
        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&replies, RATING_REPLY));
        let result = pipeline
            .create(&input, &tmp.join("generated"), ItemKind::Qa, Some(10), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.report.chunks_total, 3);
        assert_eq!(result.report.generated, 1);
        assert!(result.report.under_generated);
        assert_eq!(result.report.skipped.len(), 2);
        assert!(result.path.ends_with("doc_qa_pairs.json"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_input_is_io_error() {
        let tmp = fresh_dir("sk_test_pipeline_missing");
        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&[], RATING_REPLY));

        let err = pipeline
            .curate(&tmp.join("nope.json"), None, None, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthError::Io { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn save_as_reads_legacy_layouts() {
        let tmp = fresh_dir("sk_test_pipeline_save_as");
        let input = tmp.join("old_cleaned.json");
        std::fs::write(
            &input,
            r#"{"filtered_pairs": [{"question": "Q?", "answer": "A"}]}"#,
        )
        .unwrap();

        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&[], RATING_REPLY));
        let path = pipeline.save_as(&input, OutputFormat::Jsonl, None).unwrap();

        assert_eq!(path, tmp.join("final/old_cleaned_jsonl.jsonl"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
        let record: serde_json::Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(record, serde_json::json!({ "question": "Q?", "answer": "A" }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn batch_summary_collects_file_errors() {
        let mut summary = BatchSummary::new(3);
        summary.record(Path::new("a.txt"), Ok(PathBuf::from("a.json"))).unwrap();
        summary
            .record(Path::new("b.txt"), Err(SynthError::validation("empty")))
            .unwrap();
        assert!(summary.record(Path::new("c.txt"), Err(SynthError::Cancelled)).is_err());

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.errors[0].0, PathBuf::from("b.txt"));
    }

    #[test]
    fn summary_dataset_round_trips_through_save_as() {
        let tmp = fresh_dir("sk_test_pipeline_summary");
        let dataset = Dataset::from_items(
            ItemKind::Summary,
            "doc.txt",
            vec![synthkit_shared::GeneratedItem::new(
                0,
                ItemBody::Summary {
                    text: "Short.".into(),
                },
            )],
        )
        .unwrap();
        let input = tmp.join("doc_summary.json");
        write_json(&input, &DatasetFile::new(dataset)).unwrap();

        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&[], RATING_REPLY));
        let path = pipeline.save_as(&input, OutputFormat::Ft, None).unwrap();
        let records: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records[0]["messages"][2]["content"], "Short.");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn long_summary_is_built_from_chunk_summaries() {
        let tmp = fresh_dir("sk_test_pipeline_rolling");
        let input = tmp.join("long.txt");
        std::fs::write(&input, "z".repeat(100)).unwrap();

        let replies = ["Part one.", "Part two.", "Part three.", "Whole summary."];
        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&replies, RATING_REPLY));
        let result = pipeline
            .create(&input, &tmp.join("generated"), ItemKind::Summary, None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.report.chunks_total, 4);
        assert_eq!(result.report.generated, 1);
        assert!(result.report.skipped.is_empty());

        let file = DatasetFile::from_json_str(&std::fs::read_to_string(&result.path).unwrap(), "summary")
            .unwrap();
        assert_eq!(
            file.items[0].body,
            ItemBody::Summary {
                text: "Whole summary.".into()
            }
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn enhance_rewrites_qa_pairs_as_reasoning_conversations() {
        let tmp = fresh_dir("sk_test_pipeline_enhance");
        let input = tmp.join("doc_qa_pairs.json");
        std::fs::write(
            &input,
            r#"{"qa_pairs": [{"question": "Why?", "answer": "Because."}]}"#,
        )
        .unwrap();

        let reply = r#"[
            {"role": "system", "content": "You are helpful."},
            {"role": "user", "content": "Why?"},
            {"role": "assistant", "content": "Step 1: look at the cause. So the answer is: Because."}
        ]"#;
        let pipeline = Pipeline::new(settings(&tmp), FakeModel::new(&[reply], RATING_REPLY));
        let result = pipeline
            .enhance(&input, &tmp.join("generated"), None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.path, tmp.join("generated/doc_qa_pairs_enhanced.json"));
        assert_eq!(result.report.enhanced, 1);

        let file = DatasetFile::from_json_str(&std::fs::read_to_string(&result.path).unwrap(), "enhanced")
            .unwrap();
        assert_eq!(file.kind, ItemKind::Conversation);
        assert_eq!(file.enhancement.as_ref().map(|r| r.total), Some(1));
        match &file.items[0].body {
            ItemBody::Conversation { messages } => {
                assert!(messages[2].content.starts_with("Step 1:"));
            }
            other => panic!("unexpected item {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn offline_stages_need_no_client() {
        let tmp = fresh_dir("sk_test_pipeline_offline");
        let source = tmp.join("page.html");
        std::fs::write(&source, "<html><body><main><p>Offline text.</p></main></body></html>").unwrap();

        let parsed = ingest_source(
            &source.display().to_string(),
            &tmp.join("parsed"),
            Some("renamed"),
            &IngestOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(parsed, tmp.join("parsed/renamed.txt"));
        assert!(std::fs::read_to_string(&parsed).unwrap().contains("Offline text."));

        let input = tmp.join("pairs.json");
        std::fs::write(&input, r#"[{"question": "Q?", "answer": "A"}]"#).unwrap();
        let path = save_dataset(
            &input,
            OutputFormat::Chatml,
            None,
            &tmp.join("final"),
            &FormatOptions::default(),
        )
        .unwrap();
        assert_eq!(path, tmp.join("final/pairs_chatml.jsonl"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
