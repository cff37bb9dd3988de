//! Core domain types for SynthKit datasets.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, SynthError};
use crate::report::{CurationAudit, EnhanceReport, GenerationReport};

/// Current schema version for the on-disk dataset envelope.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// DatasetId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for dataset identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub Uuid);

impl DatasetId {
    /// Generate a new time-sortable dataset identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DatasetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Document / Chunk
// ---------------------------------------------------------------------------

/// Raw ingested text, identified by the path or URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    source: String,
    text: String,
    content_hash: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let content_hash = sha256_hex(&text);
        Self {
            source: source.into(),
            text,
            content_hash,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// SHA-256 hex digest of the text.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A window over a document. `start`/`end` are character offsets, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in document order.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

// ---------------------------------------------------------------------------
// Generated items
// ---------------------------------------------------------------------------

/// The kind of example a dataset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Qa,
    Cot,
    Summary,
    Conversation,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qa => "qa",
            Self::Cot => "cot",
            Self::Summary => "summary",
            Self::Conversation => "conversation",
        }
    }

    /// File-name suffix used by the `create` stage (`<stem>_<suffix>.json`).
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Qa => "qa_pairs",
            Self::Cot => "cot_examples",
            Self::Summary => "summary",
            Self::Conversation => "conversations",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qa" => Ok(Self::Qa),
            "cot" => Ok(Self::Cot),
            "summary" => Ok(Self::Summary),
            "conversation" | "conversations" => Ok(Self::Conversation),
            other => Err(SynthError::config(format!(
                "unknown content type '{other}': expected qa, cot, summary or conversation"
            ))),
        }
    }
}

/// One message of a conversation example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// The payload of a generated example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ItemBody {
    #[serde(rename = "qa")]
    QaPair { question: String, answer: String },
    #[serde(rename = "cot")]
    CotExample {
        question: String,
        reasoning: String,
        answer: String,
    },
    #[serde(rename = "summary")]
    Summary { text: String },
    #[serde(rename = "conversation")]
    Conversation { messages: Vec<ChatTurn> },
}

impl ItemBody {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::QaPair { .. } => ItemKind::Qa,
            Self::CotExample { .. } => ItemKind::Cot,
            Self::Summary { .. } => ItemKind::Summary,
            Self::Conversation { .. } => ItemKind::Conversation,
        }
    }

    /// Normalized content key used to detect duplicates across overlapping chunks.
    ///
    /// Case-folded and whitespace-collapsed. QA and CoT items are keyed on the
    /// question alone, so the same question asked twice counts once.
    pub fn fingerprint(&self) -> String {
        match self {
            Self::QaPair { question, .. } | Self::CotExample { question, .. } => {
                normalize_text(question)
            }
            Self::Summary { text } => normalize_text(text),
            Self::Conversation { messages } => messages
                .iter()
                .map(|m| format!("{}:{}", m.role.to_lowercase(), normalize_text(&m.content)))
                .collect::<Vec<_>>()
                .join("\u{1f}"),
        }
    }
}

/// A generated example tagged with the chunk it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedItem {
    pub chunk_index: usize,
    #[serde(flatten)]
    pub body: ItemBody,
}

impl GeneratedItem {
    pub fn new(chunk_index: usize, body: ItemBody) -> Self {
        Self { chunk_index, body }
    }

    pub fn kind(&self) -> ItemKind {
        self.body.kind()
    }
}

/// A generated item plus the judge's verdict. `score` is `None` when the judge
/// did not (or could not) score the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: GeneratedItem,
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An ordered sequence of items that all share one [`ItemKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    kind: ItemKind,
    source: String,
    items: Vec<GeneratedItem>,
}

impl Dataset {
    pub fn new(kind: ItemKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            items: Vec::new(),
        }
    }

    /// Build a dataset from existing items, rejecting any item of another kind.
    pub fn from_items(
        kind: ItemKind,
        source: impl Into<String>,
        items: Vec<GeneratedItem>,
    ) -> Result<Self> {
        let mut dataset = Self::new(kind, source);
        dataset.items.reserve(items.len());
        for item in items {
            dataset.push(item)?;
        }
        Ok(dataset)
    }

    /// Append an item. Fails if its kind differs from the dataset's kind.
    pub fn push(&mut self, item: GeneratedItem) -> Result<()> {
        if item.kind() != self.kind {
            return Err(SynthError::validation(format!(
                "cannot add a {} item to a {} dataset",
                item.kind(),
                self.kind
            )));
        }
        self.items.push(item);
        Ok(())
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn items(&self) -> &[GeneratedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<GeneratedItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DatasetFile
// ---------------------------------------------------------------------------

/// The JSON envelope written by the `create` and `curate` stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Identifier of the run that produced this file.
    pub id: DatasetId,
    pub kind: ItemKind,
    /// Path or URL of the original document.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<GeneratedItem>,
    /// Generation statistics (present on `create` output).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationReport>,
    /// Curation statistics and the full scored list (present on `curate` output).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curation: Option<CurationAudit>,
    /// Present on `cot-enhance` output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<EnhanceReport>,
}

impl DatasetFile {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: DatasetId::new(),
            kind: dataset.kind,
            source: dataset.source,
            created_at: Utc::now(),
            items: dataset.items,
            generation: None,
            curation: None,
            enhancement: None,
        }
    }

    /// Validate the envelope and turn it back into a [`Dataset`].
    pub fn into_dataset(self) -> Result<Dataset> {
        if self.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(SynthError::validation(format!(
                "unsupported schema_version: {} (expected {})",
                self.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }
        Dataset::from_items(self.kind, self.source, self.items)
    }

    /// Parse a dataset file.
    ///
    /// Besides the native envelope this accepts the flat layouts older tooling
    /// produced: `{"qa_pairs": [...]}`, `{"filtered_pairs": [...]}`,
    /// `{"cot_examples": [...]}`, `{"conversations": [[...], ...]}`,
    /// `{"summary": "..."}` and a bare array of question/answer objects.
    pub fn from_json_str(json: &str, source: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| SynthError::validation(format!("{source}: invalid JSON: {e}")))?;

        if value.get("schema_version").is_some() {
            return serde_json::from_value(value).map_err(|e| {
                SynthError::validation(format!("{source}: invalid dataset file: {e}"))
            });
        }

        let dataset = legacy_dataset(&value, source)?;
        Ok(Self::new(dataset))
    }
}

fn legacy_dataset(value: &serde_json::Value, source: &str) -> Result<Dataset> {
    let field = |name: &str| value.get(name).and_then(|v| v.as_array());

    if let Some(pairs) = field("qa_pairs")
        .or_else(|| field("filtered_pairs"))
        .or_else(|| value.as_array())
    {
        let items = pairs
            .iter()
            .filter_map(|p| {
                Some(ItemBody::QaPair {
                    question: p.get("question")?.as_str()?.to_string(),
                    answer: p.get("answer")?.as_str()?.to_string(),
                })
            })
            .map(|body| GeneratedItem::new(0, body))
            .collect();
        return Dataset::from_items(ItemKind::Qa, source, items);
    }

    if let Some(examples) = field("cot_examples") {
        let items = examples
            .iter()
            .filter_map(|e| {
                Some(ItemBody::CotExample {
                    question: e.get("question")?.as_str()?.to_string(),
                    reasoning: e.get("reasoning")?.as_str()?.to_string(),
                    answer: e.get("answer")?.as_str()?.to_string(),
                })
            })
            .map(|body| GeneratedItem::new(0, body))
            .collect();
        return Dataset::from_items(ItemKind::Cot, source, items);
    }

    if let Some(conversations) = field("conversations") {
        let items = conversations
            .iter()
            .filter_map(|c| serde_json::from_value::<Vec<ChatTurn>>(c.clone()).ok())
            .map(|messages| GeneratedItem::new(0, ItemBody::Conversation { messages }))
            .collect();
        return Dataset::from_items(ItemKind::Conversation, source, items);
    }

    if let Some(text) = value.get("summary").and_then(|s| s.as_str()) {
        let items = vec![GeneratedItem::new(
            0,
            ItemBody::Summary {
                text: text.to_string(),
            },
        )];
        return Dataset::from_items(ItemKind::Summary, source, items);
    }

    Err(SynthError::validation(format!(
        "{source}: unrecognized data format, expected a dataset file, QA pairs or conversations"
    )))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}
