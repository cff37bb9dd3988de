//! Shared types, error model, and configuration for SynthKit.
//!
//! This crate is the foundation depended on by all other SynthKit crates.
//! It provides:
//! - [`SynthError`]: the unified error type
//! - Domain types ([`Document`], [`Chunk`], [`GeneratedItem`], [`Dataset`], [`DatasetFile`])
//! - Run reports ([`GenerationReport`], [`CurationReport`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)

pub mod config;
pub mod error;
pub mod report;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CurationSettings, Difficulty, EndpointConfig, GenerationSettings, Language,
    PathSettings, PromptsConfig, ProviderKind, ProviderSettings, RetrySettings, Settings,
    config_dir, config_file_path, init_config, load_config, load_config_from, render_config,
    validate_chunking, validate_threshold,
};
pub use error::{Result, SynthError};
pub use report::{CurationAudit, CurationReport, EnhanceReport, GenerationReport, SkippedUnit};
pub use types::{
    CURRENT_SCHEMA_VERSION, ChatTurn, Chunk, Dataset, DatasetFile, DatasetId, Document,
    GeneratedItem, ItemBody, ItemKind, ScoredItem, normalize_text, sha256_hex,
};
