//! Application configuration for SynthKit.
//!
//! User config lives at `~/.synthkit/synthkit.toml`.
//! CLI flags override config file values, which override defaults.
//! The TOML shape is [`AppConfig`]; components receive the validated,
//! immutable [`Settings`] built from it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "synthkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".synthkit";

// ---------------------------------------------------------------------------
// Config structs (matching synthkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stage directories.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Which provider to talk to.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub vllm: EndpointConfig,

    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: EndpointConfig,

    #[serde(default = "default_ollama")]
    pub ollama: EndpointConfig,

    /// Generation parameters.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Curation parameters.
    #[serde(default)]
    pub curate: CurateConfig,

    /// Retry policy for LLM calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Output format defaults.
    #[serde(default)]
    pub format: FormatConfig,

    /// Prompt template overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            llm: LlmConfig::default(),
            vllm: EndpointConfig::default(),
            api_endpoint: default_api_endpoint(),
            ollama: default_ollama(),
            generation: GenerationConfig::default(),
            curate: CurateConfig::default(),
            retry: RetryConfig::default(),
            format: FormatConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_input_dir")]
    pub input: String,
    #[serde(default = "default_parsed_dir")]
    pub parsed: String,
    #[serde(default = "default_generated_dir")]
    pub generated: String,
    #[serde(default = "default_curated_dir")]
    pub curated: String,
    #[serde(default = "default_final_dir", rename = "final")]
    pub final_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input_dir(),
            parsed: default_parsed_dir(),
            generated: default_generated_dir(),
            curated: default_curated_dir(),
            final_dir: default_final_dir(),
        }
    }
}

fn default_input_dir() -> String {
    "data/input".into()
}
fn default_parsed_dir() -> String {
    "data/parsed".into()
}
fn default_generated_dir() -> String {
    "data/generated".into()
}
fn default_curated_dir() -> String {
    "data/curated".into()
}
fn default_final_dir() -> String {
    "data/final".into()
}

/// Supported LLM back ends. All speak the OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    Vllm,
    ApiEndpoint,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vllm => "vllm",
            Self::ApiEndpoint => "api-endpoint",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vllm" => Ok(Self::Vllm),
            "api-endpoint" | "api_endpoint" => Ok(Self::ApiEndpoint),
            "ollama" => Ok(Self::Ollama),
            other => Err(SynthError::config(format!(
                "unknown provider '{other}': expected vllm, api-endpoint or ollama"
            ))),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
}

/// `[vllm]`, `[api_endpoint]` and `[ollama]` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_vllm_api_base")]
    pub api_base: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base: default_vllm_api_base(),
            model: default_model(),
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_endpoint() -> EndpointConfig {
    EndpointConfig {
        api_base: "https://api.llama.com/v1".into(),
        model: "Llama-4-Maverick-17B-128E-Instruct-FP8".into(),
        api_key_env: Some("API_ENDPOINT_KEY".into()),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_ollama() -> EndpointConfig {
    EndpointConfig {
        api_base: "http://localhost:11434/v1".into(),
        model: "llama3.2".into(),
        api_key_env: None,
        timeout_secs: default_timeout_secs(),
    }
}

fn default_vllm_api_base() -> String {
    "http://localhost:8000/v1".into()
}
fn default_model() -> String {
    "meta-llama/Llama-3.3-70B-Instruct".into()
}
fn default_timeout_secs() -> u64 {
    180
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Target item count for QA, summary and conversation datasets.
    #[serde(default = "default_num_pairs")]
    pub num_pairs: usize,
    /// Target item count for chain-of-thought datasets.
    #[serde(default = "default_num_cot_examples")]
    pub num_cot_examples: usize,
    /// `english`, `arabic` or `source` (match the document).
    #[serde(default = "default_language")]
    pub language: String,
    /// `easy`, `medium` or `advanced`; unset means no difficulty instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Conversations `cot-enhance` rewrites per file; unset means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cot_enhance_examples: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            num_pairs: default_num_pairs(),
            num_cot_examples: default_num_cot_examples(),
            language: default_language(),
            difficulty: None,
            num_cot_enhance_examples: None,
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.95
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_chunk_size() -> usize {
    4000
}
fn default_overlap() -> usize {
    200
}
fn default_num_pairs() -> usize {
    25
}
fn default_num_cot_examples() -> usize {
    5
}
fn default_language() -> String {
    "english".into()
}

/// `[curate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurateConfig {
    /// Minimum score (inclusive) an item needs to be kept.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Items per judge call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_curate_temperature")]
    pub temperature: f64,
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            batch_size: default_batch_size(),
            temperature: default_curate_temperature(),
        }
    }
}

fn default_threshold() -> f64 {
    7.0
}
fn default_batch_size() -> usize {
    32
}
fn default_curate_temperature() -> f64 {
    0.1
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per unit, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Double the delay after each failure instead of keeping it fixed.
    #[serde(default = "default_true")]
    pub exponential: bool,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            exponential: true,
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_max_backoff_ms() -> u64 {
    30_000
}

/// `[format]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    /// `jsonl`, `alpaca`, `ft` or `chatml`.
    #[serde(default = "default_format")]
    pub default: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            default: default_format(),
        }
    }
}

fn default_format() -> String {
    "jsonl".into()
}

/// `[prompts]` section. Each entry replaces the built-in template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cot_generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cot_enhancement: Option<String>,
}

// ---------------------------------------------------------------------------
// Runtime settings (validated, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Output language requested from the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    English,
    Arabic,
    /// Answer in the language of the source document.
    Source,
}

impl std::str::FromStr for Language {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "arabic" | "ar" => Ok(Self::Arabic),
            "source" => Ok(Self::Source),
            other => Err(SynthError::config(format!(
                "unknown language '{other}': expected english, arabic or source"
            ))),
        }
    }
}

/// Difficulty level requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "advanced" | "hard" => Ok(Self::Advanced),
            other => Err(SynthError::config(format!(
                "unknown difficulty '{other}': expected easy, medium or advanced"
            ))),
        }
    }
}

/// Directories each stage writes into.
#[derive(Debug, Clone)]
pub struct PathSettings {
    pub input: PathBuf,
    pub parsed: PathBuf,
    pub generated: PathBuf,
    pub curated: PathBuf,
    pub final_dir: PathBuf,
}

/// Paths need no validation, so stages that never call a model can use them
/// without building full [`Settings`].
impl From<&PathsConfig> for PathSettings {
    fn from(paths: &PathsConfig) -> Self {
        Self {
            input: PathBuf::from(&paths.input),
            parsed: PathBuf::from(&paths.parsed),
            generated: PathBuf::from(&paths.generated),
            curated: PathBuf::from(&paths.curated),
            final_dir: PathBuf::from(&paths.final_dir),
        }
    }
}

/// Connection details for the selected provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_base: String,
    pub model: String,
    /// Resolved from the configured env var; `None` for local servers.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub chunk_size: usize,
    pub overlap: usize,
    pub num_pairs: usize,
    pub num_cot_examples: usize,
    pub language: Language,
    pub difficulty: Option<Difficulty>,
    pub num_cot_enhance_examples: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CurationSettings {
    pub threshold: f64,
    pub batch_size: usize,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub exponential: bool,
    pub max_backoff: Duration,
}

/// Immutable, validated settings handed to every component at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: PathSettings,
    pub provider: ProviderSettings,
    pub generation: GenerationSettings,
    pub curation: CurationSettings,
    pub retry: RetrySettings,
    pub default_format: String,
    pub prompts: PromptsConfig,
}

impl Settings {
    /// Validate a config and resolve it into runtime settings.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let g = &config.generation;
        validate_chunking(g.chunk_size, g.overlap)?;
        validate_threshold(config.curate.threshold)?;
        if config.curate.batch_size == 0 {
            return Err(SynthError::config("curate.batch_size must be at least 1"));
        }
        if config.retry.max_attempts == 0 {
            return Err(SynthError::config("retry.max_attempts must be at least 1"));
        }

        let difficulty = g.difficulty.as_deref().map(str::parse).transpose()?;

        Ok(Self {
            paths: PathSettings::from(&config.paths),
            provider: resolve_provider(config),
            generation: GenerationSettings {
                temperature: g.temperature,
                top_p: g.top_p,
                max_tokens: g.max_tokens,
                chunk_size: g.chunk_size,
                overlap: g.overlap,
                num_pairs: g.num_pairs,
                num_cot_examples: g.num_cot_examples,
                language: g.language.parse()?,
                difficulty,
                num_cot_enhance_examples: g.num_cot_enhance_examples,
            },
            curation: CurationSettings {
                threshold: config.curate.threshold,
                batch_size: config.curate.batch_size,
                temperature: config.curate.temperature,
                max_tokens: g.max_tokens,
            },
            retry: RetrySettings {
                max_attempts: config.retry.max_attempts,
                backoff: Duration::from_millis(config.retry.backoff_ms),
                exponential: config.retry.exponential,
                max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
            },
            default_format: config.format.default.clone(),
            prompts: config.prompts.clone(),
        })
    }
}

/// Chunk size must be positive and strictly larger than the overlap.
pub fn validate_chunking(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(SynthError::config("chunk_size must be at least 1"));
    }
    if overlap >= chunk_size {
        return Err(SynthError::config(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Scores live on a 0-10 scale, so the threshold must too.
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || !(0.0..=10.0).contains(&threshold) {
        return Err(SynthError::config(format!(
            "threshold ({threshold}) must be between 0 and 10"
        )));
    }
    Ok(())
}

fn resolve_provider(config: &AppConfig) -> ProviderSettings {
    let kind = config.llm.provider;
    let endpoint = match kind {
        ProviderKind::Vllm => &config.vllm,
        ProviderKind::ApiEndpoint => &config.api_endpoint,
        ProviderKind::Ollama => &config.ollama,
    };

    let api_key = endpoint
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.is_empty());

    if kind == ProviderKind::ApiEndpoint && api_key.is_none() {
        tracing::warn!(
            env = endpoint.api_key_env.as_deref().unwrap_or("<unset>"),
            "no API key found for api-endpoint provider"
        );
    }

    ProviderSettings {
        kind,
        api_base: endpoint.api_base.clone(),
        model: endpoint.model.clone(),
        api_key,
        timeout: Duration::from_secs(endpoint.timeout_secs),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.synthkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SynthError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.synthkit/synthkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SynthError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SynthError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Render a config as pretty TOML.
pub fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| SynthError::config(e.to_string()))
}

/// Write a default config file to `path` (or the default location).
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| SynthError::io(dir, e))?;
    }

    let content = render_config(&AppConfig::default())?;
    std::fs::write(&path, content).map_err(|e| SynthError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = render_config(&config).expect("serialize default config");
        assert!(toml_str.contains("chunk_size"));
        assert!(toml_str.contains("API_ENDPOINT_KEY"));
        assert!(toml_str.contains("[curate]"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = render_config(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generation.chunk_size, 4000);
        assert_eq!(parsed.generation.overlap, 200);
        assert_eq!(parsed.curate.threshold, 7.0);
        assert_eq!(parsed.ollama.api_base, "http://localhost:11434/v1");
        assert_eq!(parsed.paths.final_dir, "data/final");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[llm]
provider = "ollama"

[generation]
chunk_size = 1000
overlap = 100

[curate]
threshold = 8.5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.llm.provider, ProviderKind::Ollama);
        assert_eq!(config.generation.num_pairs, 25);
        assert_eq!(config.curate.batch_size, 32);

        let settings = Settings::from_config(&config).expect("settings");
        assert_eq!(settings.provider.kind, ProviderKind::Ollama);
        assert_eq!(settings.provider.model, "llama3.2");
        assert_eq!(settings.generation.chunk_size, 1000);
        assert_eq!(settings.curation.threshold, 8.5);
        assert_eq!(settings.retry.backoff, Duration::from_millis(1000));
    }

    #[test]
    fn path_settings_need_no_provider() {
        let toml_str = r#"
[paths]
parsed = "out/text"

[generation]
num_cot_enhance_examples = 4

[prompts]
cot_enhancement = "Add reasoning to {conversations}"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let paths = PathSettings::from(&config.paths);
        assert_eq!(paths.parsed, PathBuf::from("out/text"));
        assert_eq!(paths.final_dir, PathBuf::from("data/final"));

        let settings = Settings::from_config(&config).expect("settings");
        assert_eq!(settings.generation.num_cot_enhance_examples, Some(4));
        assert!(settings.prompts.cot_enhancement.is_some());
    }

    #[test]
    fn settings_reject_overlap_not_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.generation.chunk_size = 100;
        config.generation.overlap = 100;
        let err = Settings::from_config(&config).unwrap_err();
        assert!(matches!(err, SynthError::Config { .. }));
        assert!(err.to_string().contains("overlap (100)"));
    }

    #[test]
    fn settings_reject_bad_threshold_and_batch() {
        let mut config = AppConfig::default();
        config.curate.threshold = 11.0;
        assert!(Settings::from_config(&config).is_err());

        config.curate.threshold = f64::NAN;
        assert!(Settings::from_config(&config).is_err());

        config.curate.threshold = 7.0;
        config.curate.batch_size = 0;
        assert!(Settings::from_config(&config).is_err());
    }

    #[test]
    fn settings_parse_language_and_difficulty() {
        let mut config = AppConfig::default();
        config.generation.language = "source".into();
        config.generation.difficulty = Some("advanced".into());
        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.generation.language, Language::Source);
        assert_eq!(settings.generation.difficulty, Some(Difficulty::Advanced));

        config.generation.language = "klingon".into();
        assert!(Settings::from_config(&config).is_err());
    }

    #[test]
    fn api_key_read_from_env() {
        let mut config = AppConfig::default();
        config.llm.provider = ProviderKind::ApiEndpoint;
        // Unique env var name to avoid interfering with other tests
        config.api_endpoint.api_key_env = Some("SK_TEST_NONEXISTENT_KEY_12345".into());
        let settings = Settings::from_config(&config).unwrap();
        assert!(settings.provider.api_key.is_none());
        assert_eq!(settings.provider.api_base, "https://api.llama.com/v1");
    }

    #[test]
    fn load_and_init_config_file() {
        let tmp = std::env::temp_dir().join("sk_test_config_init");
        let _ = std::fs::remove_dir_all(&tmp);

        let path = init_config(Some(&tmp.join("synthkit.toml"))).expect("init");
        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.retry.max_attempts, 3);

        let missing = load_config_from(&tmp.join("nope.toml")).unwrap_err();
        assert!(matches!(missing, SynthError::Io { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
