//! LLM-as-judge scoring of item batches.

use std::future::Future;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use synthkit_provider::{ChatClient, ChatMessage, CompletionOptions};
use synthkit_shared::{CurationSettings, GeneratedItem, ItemBody, PromptsConfig, Result, SynthError};

use crate::prompts;
use crate::response::{self, string_field};

/// The judge's opinion of one item. `index` is relative to the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub index: usize,
    pub score: Option<f64>,
    pub rationale: Option<String>,
}

impl Verdict {
    pub fn scored(index: usize, score: f64) -> Self {
        Self {
            index,
            score: Some(score),
            rationale: None,
        }
    }
}

/// Scores a batch of items in a single call.
pub trait Judge: Send + Sync {
    fn judge(&self, batch: &[GeneratedItem]) -> impl Future<Output = Result<Vec<Verdict>>> + Send;
}

impl<J: Judge> Judge for &J {
    fn judge(&self, batch: &[GeneratedItem]) -> impl Future<Output = Result<Vec<Verdict>>> + Send {
        (**self).judge(batch)
    }
}

// ---------------------------------------------------------------------------
// LlmJudge
// ---------------------------------------------------------------------------

/// Asks a chat model to rate each item of a batch from 0 to 10.
pub struct LlmJudge<C> {
    client: C,
    template: String,
    options: CompletionOptions,
}

impl<C: ChatClient> LlmJudge<C> {
    pub fn new(client: C, settings: &CurationSettings, prompts: &PromptsConfig) -> Result<Self> {
        Ok(Self {
            client,
            template: prompts::rating_template(prompts)?,
            options: CompletionOptions {
                temperature: settings.temperature,
                top_p: None,
                max_tokens: settings.max_tokens,
            },
        })
    }

    pub fn build_messages(&self, batch: &[GeneratedItem]) -> Vec<ChatMessage> {
        let rendered = render_batch(batch);
        vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(self.template.replace("{items}", &rendered)),
        ]
    }
}

impl<C: ChatClient> Judge for LlmJudge<C> {
    #[instrument(skip_all, fields(batch_len = batch.len()))]
    async fn judge(&self, batch: &[GeneratedItem]) -> Result<Vec<Verdict>> {
        let messages = self.build_messages(batch);
        let raw = self.client.chat(&messages, &self.options).await?;
        let verdicts = parse_verdicts(&raw)?;
        debug!(verdicts = verdicts.len(), "batch rated");
        Ok(verdicts)
    }
}

/// The batch as a pretty JSON array, each record carrying its batch index.
pub fn render_batch(batch: &[GeneratedItem]) -> String {
    let records: Vec<Value> = batch
        .iter()
        .enumerate()
        .map(|(index, item)| match &item.body {
            ItemBody::QaPair { question, answer } => {
                json!({ "index": index, "question": question, "answer": answer })
            }
            ItemBody::CotExample {
                question,
                reasoning,
                answer,
            } => json!({ "index": index, "question": question, "reasoning": reasoning, "answer": answer }),
            ItemBody::Summary { text } => json!({ "index": index, "summary": text }),
            ItemBody::Conversation { messages } => json!({ "index": index, "messages": messages }),
        })
        .collect();
    serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".into())
}

/// Read verdicts from a judge reply. Accepts an array, a wrapped array or a
/// single object; `rating` for `score`; numeric strings. Records without an
/// index take their position.
pub fn parse_verdicts(text: &str) -> Result<Vec<Verdict>> {
    let records = response::as_records(
        response::extract_json(text)?,
        &["ratings", "scores", "verdicts", "results", "items"],
    );

    let verdicts: Vec<Verdict> = records
        .iter()
        .enumerate()
        .filter_map(|(position, record)| {
            let obj = record.as_object()?;
            Some(Verdict {
                index: index_field(obj).unwrap_or(position),
                score: number_field(obj, &["score", "rating"]),
                rationale: string_field(obj, &["rationale", "reason", "explanation"]),
            })
        })
        .collect();

    if verdicts.is_empty() && !records.is_empty() {
        return Err(SynthError::MalformedResponse(
            "judge reply contained no rating objects".into(),
        ));
    }
    Ok(verdicts)
}

fn index_field(obj: &Map<String, Value>) -> Option<usize> {
    ["index", "id"].iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn item(q: &str, a: &str) -> GeneratedItem {
        GeneratedItem::new(
            0,
            ItemBody::QaPair {
                question: q.into(),
                answer: a.into(),
            },
        )
    }

    struct CannedClient {
        reply: String,
        prompt: Mutex<Option<String>>,
    }

    impl ChatClient for CannedClient {
        async fn chat(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String> {
            *self.prompt.lock().unwrap() = messages.last().map(|m| m.content.clone());
            Ok(self.reply.clone())
        }
    }

    fn curation() -> CurationSettings {
        CurationSettings {
            threshold: 7.0,
            batch_size: 8,
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    #[test]
    fn parses_plain_array() {
        let verdicts = parse_verdicts(
            r#"[{"index": 0, "score": 8.5, "rationale": "good"}, {"index": 1, "score": 3}]"#,
        )
        .unwrap();
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].score, Some(8.5));
        assert_eq!(verdicts[0].rationale.as_deref(), Some("good"));
        assert_eq!(verdicts[1], Verdict::scored(1, 3.0));
    }

    #[test]
    fn accepts_aliases_strings_and_single_objects() {
        let verdicts = parse_verdicts(r#"Rating: {"rating": "7"}"#).unwrap();
        assert_eq!(verdicts, vec![Verdict::scored(0, 7.0)]);

        let verdicts = parse_verdicts(r#"{"ratings": [{"id": "2", "score": null}]}"#).unwrap();
        assert_eq!(verdicts[0].index, 2);
        assert_eq!(verdicts[0].score, None);
    }

    #[test]
    fn non_numeric_score_is_missing() {
        let verdicts = parse_verdicts(r#"[{"index": 0, "score": "excellent"}]"#).unwrap();
        assert_eq!(verdicts[0].score, None);
    }

    #[test]
    fn unparseable_reply_is_malformed() {
        let err = parse_verdicts("All of them look great!").unwrap_err();
        assert!(matches!(err, SynthError::MalformedResponse(_)));
    }

    #[test]
    fn rendered_batch_is_numbered() {
        let rendered = render_batch(&[item("A?", "a"), item("B?", "b")]);
        let records: Vec<Value> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(records[1]["index"], 1);
        assert_eq!(records[1]["question"], "B?");
    }

    #[tokio::test]
    async fn llm_judge_round_trip() {
        let client = CannedClient {
            reply: "```json\n[{\"index\": 0, \"score\": 9}, {\"index\": 1, \"score\": 4}]\n```".into(),
            prompt: Mutex::new(None),
        };
        let judge = LlmJudge::new(&client, &curation(), &PromptsConfig::default()).unwrap();

        let verdicts = judge.judge(&[item("A?", "a"), item("B?", "b")]).await.unwrap();
        assert_eq!(verdicts, vec![Verdict::scored(0, 9.0), Verdict::scored(1, 4.0)]);

        let prompt = client.prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("\"question\": \"B?\""));
        assert!(!prompt.contains("{items}"));
    }
}
