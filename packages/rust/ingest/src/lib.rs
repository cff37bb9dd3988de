//! Document ingestion: turn files and URLs into plain training text.
//!
//! Plain text and Markdown pass through unchanged. HTML (local or fetched
//! over HTTP) is converted to Markdown-flavoured text. Binary office and PDF
//! formats are recognized and rejected with a parse error.

mod cleanup;
mod html;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use synthkit_shared::{Document, Result, SynthError};

pub use html::{ConvertedHtml, html_to_text};

/// Extensions the `ingest` stage picks up when given a directory.
pub const INGEST_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "html", "htm"];

/// Extensions we recognize but cannot parse.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "pptx", "ppt", "lance"];

/// Default cap on a fetched response body (20 MB).
const MAX_RESPONSE_SIZE: usize = 20 * 1024 * 1024;

/// Maximum number of redirects to follow when fetching a URL.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("SynthKit/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Source detection
// ---------------------------------------------------------------------------

/// How a source will be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `.txt`, `.md` and anything without a known binary extension.
    PlainText,
    Html,
    Url,
}

/// Decide how to read `source`. Rejects formats that need a binary parser.
pub fn detect(source: &str) -> Result<SourceKind> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let url = Url::parse(source)
            .map_err(|e| SynthError::validation(format!("invalid URL {source}: {e}")))?;
        if is_youtube(&url) {
            return Err(SynthError::parse(format!(
                "{source}: YouTube transcripts are not supported"
            )));
        }
        return Ok(SourceKind::Url);
    }

    match extension_of(Path::new(source)).as_deref() {
        Some("html" | "htm") => Ok(SourceKind::Html),
        Some(ext) if UNSUPPORTED_EXTENSIONS.contains(&ext) => Err(SynthError::parse(format!(
            "{source}: unsupported format '.{ext}' (convert it to text or HTML first)"
        ))),
        _ => Ok(SourceKind::PlainText),
    }
}

fn is_youtube(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h == "youtu.be" || h == "youtube.com" || h.ends_with(".youtube.com"))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Options for reading sources.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Timeout for HTTP fetches.
    pub timeout: Duration,
    /// Largest response body accepted from a URL, in bytes.
    pub max_response_bytes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_response_bytes: MAX_RESPONSE_SIZE,
        }
    }
}

/// Parse a file path or URL into a [`Document`].
#[instrument(skip(opts))]
pub async fn parse(source: &str, opts: &IngestOptions) -> Result<Document> {
    let doc = match detect(source)? {
        SourceKind::Url => fetch_url(source, opts).await?,
        SourceKind::Html => {
            let raw = read_text_file(Path::new(source))?;
            Document::new(source, convert_html(&raw)?)
        }
        SourceKind::PlainText => Document::new(source, read_text_file(Path::new(source))?),
    };

    info!(
        chars = doc.char_len(),
        hash = &doc.content_hash()[..12],
        "document parsed"
    );
    Ok(doc)
}

fn convert_html(raw: &str) -> Result<String> {
    let converted = html_to_text(raw)?;
    info!(
        title = converted.title.as_deref().unwrap_or("(untitled)"),
        words = converted.word_count,
        "converted HTML"
    );
    Ok(converted.text)
}

fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| SynthError::io(path, e))?;
    String::from_utf8(bytes)
        .map_err(|_| SynthError::parse(format!("{}: file is not valid UTF-8 text", path.display())))
}

/// Fetch a URL and convert the body according to its content type.
pub async fn fetch_url(source: &str, opts: &IngestOptions) -> Result<Document> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(opts.timeout)
        .build()
        .map_err(|e| SynthError::Network(format!("failed to build HTTP client: {e}")))?;

    let mut response = client
        .get(source)
        .send()
        .await
        .map_err(|e| SynthError::Network(format!("{source}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SynthError::Network(format!("{source}: HTTP {status}")));
    }

    let is_plain = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/plain") || ct.starts_with("text/markdown"));

    // Content-Length may be absent, so cap while streaming.
    let limit = opts.max_response_bytes;
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| SynthError::Network(format!("{source}: failed to read body: {e}")))?
    {
        if bytes.len() + chunk.len() > limit {
            return Err(SynthError::validation(format!(
                "{source}: response larger than {limit} bytes"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    let body = String::from_utf8_lossy(&bytes).into_owned();
    debug!(bytes = bytes.len(), is_plain, "fetched URL");

    let text = if is_plain { body } else { convert_html(&body)? };
    Ok(Document::new(source, text))
}

// ---------------------------------------------------------------------------
// Naming and directory scanning
// ---------------------------------------------------------------------------

/// File stem used for a source's stage outputs.
///
/// Files use their own stem; URLs use host and path, e.g.
/// `https://example.com/docs/intro` becomes `example_com_docs_intro`.
pub fn output_stem(source: &str) -> String {
    if let Ok(url) = Url::parse(source) {
        if matches!(url.scheme(), "http" | "https") {
            let raw = format!("{}{}", url.host_str().unwrap_or("page"), url.path());
            return sanitize_stem(&raw);
        }
    }

    Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_stem)
        .unwrap_or_else(|| "document".into())
}

fn sanitize_stem(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('_');
    if trimmed.is_empty() {
        "document".into()
    } else {
        trimmed.to_string()
    }
}

/// Files directly inside `dir` whose extension is in `extensions`, sorted.
pub fn list_supported_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    Ok(directory_stats(dir, extensions)?.supported)
}

/// What a directory batch would pick up, without touching file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Regular files directly inside the directory.
    pub total_files: usize,
    /// Files a batch would process, sorted.
    pub supported: Vec<PathBuf>,
    pub unsupported_files: usize,
    /// Supported file count per lowercase extension.
    pub by_extension: BTreeMap<String, usize>,
}

/// Scan `dir` (non-recursively) and classify its files by `extensions`.
pub fn directory_stats(dir: &Path, extensions: &[&str]) -> Result<DirectoryStats> {
    if !dir.is_dir() {
        return Err(SynthError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| SynthError::io(dir, e))?;
    let mut stats = DirectoryStats::default();
    for entry in entries {
        let path = entry.map_err(|e| SynthError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        stats.total_files += 1;
        match extension_of(&path).filter(|ext| extensions.contains(&ext.as_str())) {
            Some(ext) => {
                *stats.by_extension.entry(ext).or_default() += 1;
                stats.supported.push(path);
            }
            None => stats.unsupported_files += 1,
        }
    }
    stats.supported.sort();
    Ok(stats)
}
