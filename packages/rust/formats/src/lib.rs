//! Fine-tuning output formats.
//!
//! | Format   | Layout      | Record |
//! |----------|-------------|--------|
//! | `jsonl`  | JSON Lines  | the item's own fields (`question`/`answer`, ...) |
//! | `alpaca` | JSON array  | `{instruction, input, output}` |
//! | `ft`     | JSON array  | `{messages}` with an OpenAI fine-tuning system prompt |
//! | `chatml` | JSON Lines  | `{messages}` with a ChatML system prompt |

mod write;

use std::fmt;

use serde_json::{Value, json};

use synthkit_shared::{ChatTurn, Dataset, GeneratedItem, ItemBody, Result, SynthError};

pub use write::{write_atomic, write_json};

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jsonl,
    Alpaca,
    Ft,
    Chatml,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Jsonl, Self::Alpaca, Self::Ft, Self::Chatml];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Alpaca => "alpaca",
            Self::Ft => "ft",
            Self::Chatml => "chatml",
        }
    }

    /// File extension of the serialized output.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl | Self::Chatml => "jsonl",
            Self::Alpaca | Self::Ft => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "alpaca" => Ok(Self::Alpaca),
            "ft" => Ok(Self::Ft),
            "chatml" => Ok(Self::Chatml),
            other => Err(SynthError::config(format!(
                "unknown format '{other}': expected jsonl, alpaca, ft or chatml"
            ))),
        }
    }
}

/// Fixed text injected into records.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub ft_system_prompt: String,
    pub chatml_system_prompt: String,
    /// User turn paired with each summary.
    pub summary_instruction: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            ft_system_prompt: "You are a helpful assistant.".into(),
            chatml_system_prompt: "You are a helpful AI assistant.".into(),
            summary_instruction: "Summarize the document.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Render a dataset in `format`. Line-oriented formats end with a newline
/// unless the dataset is empty.
pub fn serialize(dataset: &Dataset, format: OutputFormat, opts: &FormatOptions) -> Result<String> {
    let records: Vec<Value> = dataset
        .items()
        .iter()
        .map(|item| to_record(item, format, opts))
        .collect();

    let encode_err = |e: serde_json::Error| SynthError::validation(format!("serialization failed: {e}"));

    match format {
        OutputFormat::Jsonl | OutputFormat::Chatml => {
            let mut out = String::new();
            for record in &records {
                out.push_str(&serde_json::to_string(record).map_err(encode_err)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Alpaca | OutputFormat::Ft => {
            serde_json::to_string_pretty(&records).map_err(encode_err)
        }
    }
}

fn to_record(item: &GeneratedItem, format: OutputFormat, opts: &FormatOptions) -> Value {
    match format {
        OutputFormat::Jsonl => match &item.body {
            ItemBody::QaPair { question, answer } => json!({ "question": question, "answer": answer }),
            ItemBody::CotExample {
                question,
                reasoning,
                answer,
            } => json!({ "question": question, "reasoning": reasoning, "answer": answer }),
            ItemBody::Summary { text } => json!({ "text": text }),
            ItemBody::Conversation { messages } => json!({ "messages": messages }),
        },
        OutputFormat::Alpaca => {
            let (instruction, output) = instruction_pair(&item.body, opts);
            json!({ "instruction": instruction, "input": "", "output": output })
        }
        OutputFormat::Ft => json!({ "messages": chat_messages(&item.body, &opts.ft_system_prompt, opts) }),
        OutputFormat::Chatml => {
            json!({ "messages": chat_messages(&item.body, &opts.chatml_system_prompt, opts) })
        }
    }
}

/// The (user, assistant) text pair an item teaches.
fn instruction_pair(body: &ItemBody, opts: &FormatOptions) -> (String, String) {
    match body {
        ItemBody::QaPair { question, answer } => (question.clone(), answer.clone()),
        ItemBody::CotExample {
            question,
            reasoning,
            answer,
        } => (question.clone(), cot_answer(reasoning, answer)),
        ItemBody::Summary { text } => (opts.summary_instruction.clone(), text.clone()),
        ItemBody::Conversation { messages } => {
            let user = messages.iter().position(|m| m.role == "user");
            let instruction = user.map(|i| messages[i].content.clone()).unwrap_or_default();
            let output = user
                .and_then(|i| messages[i..].iter().find(|m| m.role == "assistant"))
                .map(|m| m.content.clone())
                .unwrap_or_default();
            (instruction, output)
        }
    }
}

/// System + user + assistant turns. Conversations keep their own turns and
/// only gain a system prompt when they lack one.
fn chat_messages(body: &ItemBody, system_prompt: &str, opts: &FormatOptions) -> Vec<ChatTurn> {
    match body {
        ItemBody::Conversation { messages } => {
            let mut turns = Vec::with_capacity(messages.len() + 1);
            if messages.first().is_none_or(|m| m.role != "system") {
                turns.push(ChatTurn::new("system", system_prompt));
            }
            turns.extend(messages.iter().cloned());
            turns
        }
        other => {
            let (user, assistant) = instruction_pair(other, opts);
            vec![
                ChatTurn::new("system", system_prompt),
                ChatTurn::new("user", user),
                ChatTurn::new("assistant", assistant),
            ]
        }
    }
}

/// Chain-of-thought answer text as it appears in training records.
pub fn cot_answer(reasoning: &str, answer: &str) -> String {
    format!("Let me think through this step by step:\n\n{reasoning}\n\nSo the answer is: {answer}")
}
