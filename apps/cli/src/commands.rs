//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use synthkit_core::{
    BatchSummary, Pipeline, ProgressReporter, RunOptions, RunReport, ingest_source, save_dataset,
};
use synthkit_formats::{FormatOptions, OutputFormat};
use synthkit_ingest::{DirectoryStats, INGEST_EXTENSIONS, IngestOptions, directory_stats, list_supported_files};
use synthkit_provider::{OpenAiCompatibleClient, check_server};
use synthkit_shared::{
    AppConfig, CurationReport, EnhanceReport, GenerationReport, ItemKind, PathSettings, ProviderKind,
    Settings, SynthError, config_file_path, init_config, load_config, load_config_from, render_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SynthKit: turn documents into fine-tuning datasets.
#[derive(Parser)]
#[command(
    name = "synthkit",
    version,
    about = "Generate, curate and export LLM fine-tuning datasets from documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.synthkit/synthkit.toml).
    #[arg(short, long, global = true, env = "SYNTHKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// LLM provider: vllm, api-endpoint or ollama.
    #[arg(long, global = true)]
    pub provider: Option<ProviderKind>,

    /// Override the provider's API base URL.
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Override the provider's model.
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Parse a file, URL or directory of files into plain text.
    Ingest {
        /// File path, URL, or directory.
        input: String,

        /// Output directory (defaults to paths.parsed).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output file stem for a single input.
        #[arg(short, long)]
        name: Option<String>,

        /// List the files a directory input would process, then stop.
        #[arg(long)]
        preview: bool,
    },

    /// Generate a dataset from parsed text.
    Create {
        /// A .txt file or a directory of them.
        input: PathBuf,

        /// Content type: qa, cot, summary or conversation.
        #[arg(short = 't', long = "type", default_value = "qa")]
        kind: ItemKind,

        /// Target number of items.
        #[arg(short, long)]
        num_pairs: Option<usize>,

        /// Output directory (defaults to paths.generated).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Chunk size in characters.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap between chunks in characters.
        #[arg(long)]
        overlap: Option<usize>,

        /// Question difficulty: easy, medium or advanced.
        #[arg(long)]
        difficulty: Option<String>,

        /// Output language: english, arabic or source.
        #[arg(long)]
        language: Option<String>,

        /// List the files a directory input would process, then stop.
        #[arg(long)]
        preview: bool,
    },

    /// Score a dataset with an LLM judge and keep the good items.
    Curate {
        /// A dataset .json file or a directory of them.
        input: PathBuf,

        /// Output file (single input) or directory (directory input).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum score to keep, 0-10.
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Items per judge call.
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// List the files a directory input would process, then stop.
        #[arg(long)]
        preview: bool,
    },

    /// Export a dataset in a fine-tuning format.
    #[command(name = "save-as")]
    SaveAs {
        /// A dataset .json file or a directory of them.
        input: PathBuf,

        /// jsonl, alpaca, ft or chatml (defaults to format.default).
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Output file (single input) or directory (directory input).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// List the files a directory input would process, then stop.
        #[arg(long)]
        preview: bool,
    },

    /// Rewrite QA pairs or conversations with step-by-step reasoning.
    #[command(name = "cot-enhance")]
    CotEnhance {
        /// A dataset .json file or a directory of them.
        input: PathBuf,

        /// Output directory (defaults to paths.generated).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Enhance at most this many conversations per file.
        #[arg(short, long)]
        num_examples: Option<usize>,

        /// List the files a directory input would process, then stop.
        #[arg(long)]
        preview: bool,
    },

    /// Ingest, create, curate and save-as in one go.
    Run {
        /// File path or URL.
        input: String,

        #[arg(short = 't', long = "type", default_value = "qa")]
        kind: ItemKind,

        #[arg(short, long)]
        num_pairs: Option<usize>,

        #[arg(long)]
        threshold: Option<f64>,

        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Output file stem.
        #[arg(long)]
        name: Option<String>,
    },

    /// Check that the configured LLM server is reachable.
    #[command(name = "system-check")]
    SystemCheck,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "synthkit=info",
        1 => "synthkit=debug",
        _ => "synthkit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // `config init` must work before any config file exists.
    if let Command::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        return cmd_config_init(cli.config.as_deref(), *force);
    }

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    apply_provider_overrides(&mut config, &cli);

    match cli.command {
        Command::Ingest {
            input,
            output_dir,
            name,
            preview,
        } => {
            if preview && preview_directory(Path::new(&input), INGEST_EXTENSIONS)? {
                return Ok(());
            }
            cmd_ingest(&config, &input, output_dir.as_deref(), name.as_deref()).await
        }
        Command::Create {
            input,
            kind,
            num_pairs,
            output_dir,
            chunk_size,
            overlap,
            difficulty,
            language,
            preview,
        } => {
            if preview && preview_directory(&input, &["txt"])? {
                return Ok(());
            }
            let g = &mut config.generation;
            if let Some(size) = chunk_size {
                g.chunk_size = size;
            }
            if let Some(overlap) = overlap {
                g.overlap = overlap;
            }
            if difficulty.is_some() {
                g.difficulty = difficulty;
            }
            if let Some(language) = language {
                g.language = language;
            }
            cmd_create(&config, &input, kind, num_pairs, output_dir.as_deref()).await
        }
        Command::Curate {
            input,
            output,
            threshold,
            batch_size,
            preview,
        } => {
            if preview && preview_directory(&input, &["json"])? {
                return Ok(());
            }
            if let Some(size) = batch_size {
                config.curate.batch_size = size;
            }
            cmd_curate(&config, &input, output.as_deref(), threshold).await
        }
        Command::SaveAs {
            input,
            format,
            output,
            preview,
        } => {
            if preview && preview_directory(&input, &["json"])? {
                return Ok(());
            }
            cmd_save_as(&config, &input, format, output.as_deref())
        }
        Command::CotEnhance {
            input,
            output_dir,
            num_examples,
            preview,
        } => {
            if preview && preview_directory(&input, &["json"])? {
                return Ok(());
            }
            cmd_cot_enhance(&config, &input, output_dir.as_deref(), num_examples).await
        }
        Command::Run {
            input,
            kind,
            num_pairs,
            threshold,
            format,
            name,
        } => {
            let opts = RunOptions {
                kind: Some(kind),
                num_items: num_pairs,
                threshold,
                format,
                name,
            };
            cmd_run(&config, &input, &opts).await
        }
        Command::SystemCheck => cmd_system_check(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(cli.config.as_deref(), force),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// `--provider`, `--api-base` and `--model` take precedence over the file.
fn apply_provider_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(kind) = cli.provider {
        config.llm.provider = kind;
    }
    let endpoint = match config.llm.provider {
        ProviderKind::Vllm => &mut config.vllm,
        ProviderKind::ApiEndpoint => &mut config.api_endpoint,
        ProviderKind::Ollama => &mut config.ollama,
    };
    if let Some(api_base) = &cli.api_base {
        endpoint.api_base = api_base.clone();
    }
    if let Some(model) = &cli.model {
        endpoint.model = model.clone();
    }
}

/// Validated settings plus a pipeline wired to the configured provider and
/// to Ctrl-C.
fn build_pipeline(config: &AppConfig) -> Result<Pipeline<OpenAiCompatibleClient>> {
    let settings = Settings::from_config(config)?;
    let client = OpenAiCompatibleClient::new(&settings.provider)?;
    info!(
        provider = %settings.provider.kind,
        model = %settings.provider.model,
        api_base = %settings.provider.api_base,
        "using LLM provider"
    );
    Ok(Pipeline::new(settings, client).with_cancel(cancel_on_ctrl_c()))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current unit");
            handle.cancel();
        }
    });
    token
}

/// Print what a directory batch would process. Returns `false` for a single
/// file, which is then processed as usual.
fn preview_directory(input: &Path, extensions: &[&str]) -> Result<bool> {
    if !input.is_dir() {
        warn!(input = %input.display(), "--preview only applies to directories, processing the file");
        return Ok(false);
    }
    let stats = directory_stats(input, extensions)?;
    print_directory_stats(input, &stats);
    Ok(true)
}

/// Supported files when `input` is a directory, `None` for a single input.
fn directory_inputs(input: &Path, extensions: &[&str]) -> Result<Option<Vec<PathBuf>>> {
    if !input.is_dir() {
        return Ok(None);
    }
    let files = list_supported_files(input, extensions)?;
    if files.is_empty() {
        return Err(eyre!(
            "no {} files found in {}",
            extensions.join("/"),
            input.display()
        ));
    }
    Ok(Some(files))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(config: &AppConfig, input: &str, output_dir: Option<&Path>, name: Option<&str>) -> Result<()> {
    let out_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathSettings::from(&config.paths).parsed);
    let opts = IngestOptions::default();

    match directory_inputs(Path::new(input), INGEST_EXTENSIONS)? {
        Some(files) => {
            let mut summary = BatchSummary::new(files.len());
            for file in &files {
                let source = file.display().to_string();
                let result = ingest_source(&source, &out_dir, None, &opts).await;
                summary.record(file, result)?;
            }
            print_batch_summary("Ingested", &summary);
        }
        None => {
            let path = ingest_source(input, &out_dir, name, &opts).await?;
            println!("  Text saved to {}", path.display());
        }
    }
    Ok(())
}

async fn cmd_create(
    config: &AppConfig,
    input: &Path,
    kind: ItemKind,
    num_items: Option<usize>,
    output_dir: Option<&Path>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let out_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| pipeline.settings().paths.generated.clone());
    let progress = CliProgress::new();

    match directory_inputs(input, &["txt"])? {
        Some(files) => {
            let mut summary = BatchSummary::new(files.len());
            for file in &files {
                let result = pipeline
                    .create(file, &out_dir, kind, num_items, &progress)
                    .await
                    .map(|created| {
                        print_generation_report(&created.report);
                        created.path
                    });
                summary.record(file, result)?;
            }
            progress.finish();
            print_batch_summary("Generated", &summary);
        }
        None => {
            let created = pipeline.create(input, &out_dir, kind, num_items, &progress).await;
            progress.finish();
            let created = created?;
            print_generation_report(&created.report);
            println!("  Dataset saved to {}", created.path.display());
            if created.report.cancelled {
                return Err(SynthError::Cancelled.into());
            }
        }
    }
    Ok(())
}

async fn cmd_curate(config: &AppConfig, input: &Path, output: Option<&Path>, threshold: Option<f64>) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let progress = CliProgress::new();

    match directory_inputs(input, &["json"])? {
        Some(files) => {
            let mut summary = BatchSummary::new(files.len());
            for file in &files {
                let target = match (output, file.file_stem()) {
                    (Some(dir), Some(stem)) => {
                        Some(dir.join(format!("{}_cleaned.json", stem.to_string_lossy())))
                    }
                    _ => None,
                };
                let result = pipeline
                    .curate(file, target.as_deref(), threshold, &progress)
                    .await
                    .map(|curated| {
                        print_curation_report(&curated.report);
                        curated.path
                    });
                summary.record(file, result)?;
            }
            progress.finish();
            print_batch_summary("Curated", &summary);
        }
        None => {
            let curated = pipeline.curate(input, output, threshold, &progress).await;
            progress.finish();
            let curated = curated?;
            print_curation_report(&curated.report);
            println!("  Cleaned dataset saved to {}", curated.path.display());
            if curated.report.cancelled {
                return Err(SynthError::Cancelled.into());
            }
        }
    }
    Ok(())
}

fn cmd_save_as(config: &AppConfig, input: &Path, format: Option<OutputFormat>, output: Option<&Path>) -> Result<()> {
    let format = match format {
        Some(format) => format,
        None => config.format.default.parse()?,
    };
    let final_dir = PathSettings::from(&config.paths).final_dir;
    let opts = FormatOptions::default();

    match directory_inputs(input, &["json"])? {
        Some(files) => {
            let mut summary = BatchSummary::new(files.len());
            for file in &files {
                let target = match (output, file.file_stem()) {
                    (Some(dir), Some(stem)) => Some(dir.join(format!(
                        "{}_{}.{}",
                        stem.to_string_lossy(),
                        format,
                        format.extension()
                    ))),
                    _ => None,
                };
                let result = save_dataset(file, format, target.as_deref(), &final_dir, &opts);
                summary.record(file, result)?;
            }
            print_batch_summary("Converted", &summary);
        }
        None => {
            let path = save_dataset(input, format, output, &final_dir, &opts)?;
            println!("  Converted to {format} format: {}", path.display());
        }
    }
    Ok(())
}

async fn cmd_cot_enhance(
    config: &AppConfig,
    input: &Path,
    output_dir: Option<&Path>,
    limit: Option<usize>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let out_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| pipeline.settings().paths.generated.clone());
    let progress = CliProgress::new();

    match directory_inputs(input, &["json"])? {
        Some(files) => {
            let mut summary = BatchSummary::new(files.len());
            for file in &files {
                let result = pipeline
                    .enhance(file, &out_dir, limit, &progress)
                    .await
                    .map(|enhanced| {
                        print_enhance_report(&enhanced.report);
                        enhanced.path
                    });
                summary.record(file, result)?;
            }
            progress.finish();
            print_batch_summary("Enhanced", &summary);
        }
        None => {
            let enhanced = pipeline.enhance(input, &out_dir, limit, &progress).await;
            progress.finish();
            let enhanced = enhanced?;
            print_enhance_report(&enhanced.report);
            println!("  Enhanced dataset saved to {}", enhanced.path.display());
            if enhanced.report.cancelled {
                return Err(SynthError::Cancelled.into());
            }
        }
    }
    Ok(())
}

async fn cmd_run(config: &AppConfig, input: &str, opts: &RunOptions) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let progress = CliProgress::new();

    let report = pipeline.run(input, opts, &progress).await;
    progress.finish();
    print_run_report(&report?);
    Ok(())
}

async fn cmd_system_check(config: &AppConfig) -> Result<()> {
    let settings = Settings::from_config(config)?;
    let provider = &settings.provider;

    if provider.kind == ProviderKind::ApiEndpoint && provider.api_key.is_none() {
        let env = config.api_endpoint.api_key_env.as_deref().unwrap_or("API_ENDPOINT_KEY");
        return Err(eyre!("{env} is not set; export it before using the api-endpoint provider"));
    }

    let status = check_server(provider)
        .await
        .map_err(|e| eyre!("{} server at {} is not reachable: {e}", provider.kind, provider.api_base))?;

    println!();
    println!("  Provider: {}", provider.kind);
    println!("  Server:   {} (reachable)", status.api_base);
    println!("  Model:    {}", provider.model);
    if status.models.is_empty() {
        println!("  Models:   (server did not list any)");
    } else {
        println!("  Models:   {}", status.models.join(", "));
        if !status.serves(&provider.model) {
            println!("  Warning:  {} is not in the server's model list", provider.model);
        }
    }
    println!();
    Ok(())
}

fn cmd_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if target.exists() && !force {
        return Err(eyre!(
            "config already exists at {} (use --force to overwrite)",
            target.display()
        ));
    }
    let path = init_config(Some(&target))?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    Settings::from_config(config)?;
    println!("{}", render_config(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

fn print_generation_report(report: &GenerationReport) {
    println!();
    println!("  Requested:  {}", report.requested);
    println!("  Generated:  {}", report.generated);
    println!(
        "  Chunks:     {} of {} processed",
        report.chunks_processed, report.chunks_total
    );
    if report.duplicates > 0 {
        println!("  Duplicates: {} dropped", report.duplicates);
    }
    for skipped in &report.skipped {
        println!(
            "  Skipped:    chunk {} after {} attempt(s): {}",
            skipped.index, skipped.attempts, skipped.reason
        );
    }
    if report.under_generated {
        println!(
            "  Note:       document ran out of chunks ({} of {} items)",
            report.generated, report.requested
        );
    }
    if report.cancelled {
        println!("  Cancelled:  partial dataset written");
    }
}

fn print_curation_report(report: &CurationReport) {
    println!();
    println!("  Total:      {}", report.total);
    println!("  Kept:       {} (threshold {})", report.passed, report.threshold);
    println!("  Below:      {}", report.below_threshold);
    if report.missing_score > 0 {
        println!("  Unscored:   {}", report.missing_score);
    }
    for failed in &report.failed_batches {
        println!(
            "  Failed:     batch {} after {} attempt(s): {}",
            failed.index, failed.attempts, failed.reason
        );
    }
    if report.excluded_by_batch_failure > 0 {
        println!("  Excluded:   {} by failed batches", report.excluded_by_batch_failure);
    }
    println!("  Avg score:  {:.2}", report.average_score);
    if report.cancelled {
        println!("  Cancelled:  partial result written");
    }
}

fn print_enhance_report(report: &EnhanceReport) {
    println!();
    println!("  Total:      {}", report.total);
    println!("  Enhanced:   {}", report.enhanced);
    for kept in &report.kept_original {
        println!(
            "  Unchanged:  conversation {} after {} attempt(s): {}",
            kept.index, kept.attempts, kept.reason
        );
    }
    if report.cancelled {
        println!("  Cancelled:  remaining conversations written unchanged");
    }
}

fn print_directory_stats(dir: &Path, stats: &DirectoryStats) {
    println!();
    println!("  Directory:  {}", dir.display());
    println!("  Files:      {}", stats.total_files);
    println!("  Supported:  {}", stats.supported.len());
    for (extension, count) in &stats.by_extension {
        println!("    .{extension}: {count}");
    }
    if stats.unsupported_files > 0 {
        println!("  Skipped:    {} unsupported", stats.unsupported_files);
    }
    if stats.supported.is_empty() {
        println!("  Nothing to process.");
    } else {
        println!("  Would process:");
        for file in &stats.supported {
            println!("    {}", file.display());
        }
    }
    println!();
}

fn print_run_report(report: &RunReport) {
    print_generation_report(&report.generation);
    print_curation_report(&report.curation);
    println!();
    println!("  Parsed:     {}", report.parsed.display());
    println!("  Generated:  {}", report.generated.display());
    println!("  Curated:    {}", report.curated.display());
    println!("  Output:     {}", report.output.display());
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn print_batch_summary(verb: &str, summary: &BatchSummary) {
    println!();
    println!("  {verb} {} of {} files", summary.succeeded(), summary.total);
    for output in &summary.outputs {
        println!("    {}", output.display());
    }
    if summary.failed() > 0 {
        println!("  {} failed:", summary.failed());
        for (input, error) in &summary.errors {
            println!("    {}: {error}", input.display());
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_prefix(name.to_string());
        self.spinner.set_message("");
    }

    fn unit_done(&self, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, message: &str) {
        self.spinner.println(format!("  {message}"));
    }
}
