//! Error types for SynthKit.
//!
//! Library crates use [`SynthError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Errors fall into two groups that drive the pipeline's propagation policy:
//! - *unit-level* errors ([`SynthError::Provider`], [`SynthError::MalformedResponse`],
//!   [`SynthError::ProviderRejected`]) only affect one chunk or one judge batch,
//!   which is skipped and recorded;
//! - *run-fatal* errors (config, I/O, validation, ...) abort the whole run.

use std::path::PathBuf;

/// Top-level error type for all SynthKit operations.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Invalid settings (chunk size, overlap, threshold, batch size, ...).
    #[error("config error: {message}")]
    Config { message: String },

    /// Transient provider failure: timeout, connection reset, rate limit, 5xx.
    #[error("provider error: {0}")]
    Provider(String),

    /// The LLM answered, but the text could not be parsed into the expected shape.
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),

    /// The provider refused the request (auth, bad request); retrying won't help.
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),

    /// Network error while fetching a source document.
    #[error("network error: {0}")]
    Network(String),

    /// Source document could not be parsed (unsupported or broken format).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (mixed dataset kinds, empty document, bad file shape).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was cancelled between units of work.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SynthError>;

impl SynthError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::MalformedResponse(_))
    }

    /// Whether this error must abort the whole run instead of skipping one unit.
    pub fn is_run_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Provider(_) | Self::MalformedResponse(_) | Self::ProviderRejected(_)
        )
    }
}
