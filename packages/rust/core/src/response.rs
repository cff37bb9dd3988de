//! Lenient parsing of LLM responses into typed items.
//!
//! Models wrap JSON in prose, fences and trailing commas. We look for JSON in
//! this order: the last fenced block, the outermost `[...]`, the outermost
//! `{...}`. Anything that still fails to decode is a
//! [`SynthError::MalformedResponse`], which the retry policy treats as transient.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use synthkit_shared::{ChatTurn, ItemBody, Result, SynthError};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\n?(.*?)```").expect("valid regex"));

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[\]}])").expect("valid regex"));

const QUESTION_KEYS: &[&str] = &["question", "q", "prompt", "query"];
const ANSWER_KEYS: &[&str] = &["answer", "a", "response", "completion"];
const REASONING_KEYS: &[&str] = &["reasoning", "rationale", "chain_of_thought", "explanation"];

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Pull the first decodable JSON value out of free-form model output.
pub fn extract_json(text: &str) -> Result<Value> {
    let fenced: Vec<&str> = FENCE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let candidates = fenced
        .into_iter()
        .rev()
        .chain(outermost(text, '[', ']'))
        .chain(outermost(text, '{', '}'));

    for candidate in candidates {
        if let Some(value) = decode(candidate) {
            return Ok(value);
        }
    }

    Err(SynthError::MalformedResponse(format!(
        "no JSON found in response: {}",
        preview(text)
    )))
}

fn outermost(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn decode(candidate: &str) -> Option<Value> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    serde_json::from_str(candidate).ok().or_else(|| {
        let repaired = TRAILING_COMMA_RE.replace_all(candidate, "$1");
        serde_json::from_str(&repaired).ok()
    })
}

/// Short, single-line excerpt for error messages.
fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 120 {
        format!("{}...", flat.chars().take(120).collect::<String>())
    } else {
        flat
    }
}

/// Treat `value` as a list of records: arrays as-is, objects unwrapped from
/// the first `wrappers` key holding an array, any other object as one record.
pub fn as_records(value: Value, wrappers: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in wrappers {
                if matches!(map.get(*key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(*key) {
                        return items;
                    }
                }
            }
            vec![Value::Object(map)]
        }
        _ => Vec::new(),
    }
}

/// First non-empty string under any of `keys`.
pub fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Item parsers
// ---------------------------------------------------------------------------

/// Question/answer pairs. Accepts common key aliases and an `answers` list.
pub fn parse_qa_pairs(text: &str) -> Result<Vec<ItemBody>> {
    let records = as_records(extract_json(text)?, &["qa_pairs", "pairs", "items", "questions"]);
    let total = records.len();

    let items: Vec<ItemBody> = records
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let question = string_field(obj, QUESTION_KEYS)?;
            let answer = string_field(obj, ANSWER_KEYS).or_else(|| first_answer(obj))?;
            Some(ItemBody::QaPair { question, answer })
        })
        .collect();

    non_empty(items, total, "QA pairs")
}

fn first_answer(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("answers")? {
        Value::Array(list) => list.iter().find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(inner) => string_field(inner, &["text", "answer"]),
            _ => None,
        }),
        _ => None,
    }
}

/// Chain-of-thought examples: question, reasoning, answer.
pub fn parse_cot_examples(text: &str) -> Result<Vec<ItemBody>> {
    let records = as_records(extract_json(text)?, &["cot_examples", "examples", "items"]);
    let total = records.len();

    let items: Vec<ItemBody> = records
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            Some(ItemBody::CotExample {
                question: string_field(obj, QUESTION_KEYS)?,
                reasoning: string_field(obj, REASONING_KEYS)?,
                answer: string_field(obj, ANSWER_KEYS)?,
            })
        })
        .collect();

    non_empty(items, total, "chain-of-thought examples")
}

/// Conversations, each either a list of `{role, content}` turns or an object
/// with a `messages` list.
pub fn parse_conversations(text: &str) -> Result<Vec<ItemBody>> {
    let value = extract_json(text)?;

    // A single bare conversation is a flat list of turns.
    let single = matches!(&value, Value::Array(items) if !items.is_empty() && items.iter().all(is_turn));
    let records = if single {
        vec![value]
    } else {
        as_records(value, &["conversations", "items"])
    };
    let total = records.len();

    let items: Vec<ItemBody> = records
        .into_iter()
        .filter_map(|record| {
            let turns = match record {
                Value::Array(turns) => turns,
                Value::Object(mut obj) => match obj.remove("messages") {
                    Some(Value::Array(turns)) => turns,
                    _ => return None,
                },
                _ => return None,
            };
            let messages: Vec<ChatTurn> = turns.iter().filter_map(to_turn).collect();
            messages
                .iter()
                .any(|m| m.role == "assistant")
                .then_some(ItemBody::Conversation { messages })
        })
        .collect();

    non_empty(items, total, "conversations")
}

/// One rewritten conversation. Accepts a flat list of turns, the same list
/// nested one level (`[[...]]`), or an object holding it under `messages` or
/// `conversations`.
pub fn parse_enhanced_turns(text: &str) -> Result<Vec<ChatTurn>> {
    let value = match extract_json(text)? {
        Value::Object(mut obj) => obj
            .remove("messages")
            .or_else(|| obj.remove("conversations"))
            .unwrap_or(Value::Null),
        other => other,
    };
    let value = match value {
        Value::Array(mut items) if matches!(items.first(), Some(Value::Array(_))) => items.swap_remove(0),
        other => other,
    };

    let turns: Vec<ChatTurn> = match &value {
        Value::Array(items) => items.iter().filter_map(to_turn).collect(),
        _ => Vec::new(),
    };
    if !turns.iter().any(|t| t.role == "assistant") {
        return Err(SynthError::MalformedResponse(format!(
            "expected a conversation with an assistant turn, got: {}",
            preview(text)
        )));
    }
    Ok(turns)
}

fn is_turn(value: &Value) -> bool {
    value.get("role").is_some() && value.get("content").is_some()
}

fn to_turn(value: &Value) -> Option<ChatTurn> {
    let obj = value.as_object()?;
    let role = string_field(obj, &["role"])?.to_lowercase();
    let content = string_field(obj, &["content", "text"])?;
    Some(ChatTurn::new(role, content))
}

/// The whole trimmed response is the summary.
pub fn parse_summary(text: &str) -> Result<Vec<ItemBody>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SynthError::MalformedResponse("empty summary".into()));
    }
    Ok(vec![ItemBody::Summary {
        text: text.to_string(),
    }])
}

/// An empty array is a valid (if unhelpful) answer; a non-empty one where
/// nothing survives validation is not.
fn non_empty(items: Vec<ItemBody>, total: usize, what: &str) -> Result<Vec<ItemBody>> {
    if items.is_empty() && total > 0 {
        return Err(SynthError::MalformedResponse(format!(
            "none of the {total} records were valid {what}"
        )));
    }
    Ok(items)
}
