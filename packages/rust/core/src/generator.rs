//! LLM-backed [`ChunkGenerator`].

use tracing::{debug, instrument};

use synthkit_provider::{ChatClient, ChatMessage, CompletionOptions};
use synthkit_shared::{Chunk, Difficulty, GenerationSettings, ItemBody, ItemKind, Language, PromptsConfig, Result};

use crate::accumulator::ChunkGenerator;
use crate::prompts;
use crate::response;

/// Items to request per chunk so that `chunks` calls roughly reach `target`.
///
/// Asks for a little more than the even share (models tend to under-deliver)
/// but never more than `max(8, share)`.
pub fn items_per_chunk(target: usize, chunks: usize) -> usize {
    let share = (target / chunks.max(1)).max(1);
    (share + 2).max(2).min(share.max(8))
}

/// Prompts a chat model for items of one kind, one chunk at a time.
pub struct LlmGenerator<C> {
    client: C,
    kind: ItemKind,
    template: String,
    language: Language,
    difficulty: Option<Difficulty>,
    per_chunk: usize,
    options: CompletionOptions,
}

impl<C: ChatClient> LlmGenerator<C> {
    /// Fails if a configured template override lacks the `{text}` placeholder.
    pub fn new(client: C, kind: ItemKind, settings: &GenerationSettings, prompts: &PromptsConfig) -> Result<Self> {
        Ok(Self {
            client,
            kind,
            template: prompts::generation_template(kind, prompts)?,
            language: settings.language,
            difficulty: settings.difficulty,
            per_chunk: 1,
            options: CompletionOptions {
                temperature: settings.temperature,
                top_p: Some(settings.top_p),
                max_tokens: settings.max_tokens,
            },
        })
    }

    /// Number of items each chunk prompt asks for.
    pub fn with_items_per_chunk(mut self, n: usize) -> Self {
        self.per_chunk = n.max(1);
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// System and user messages for one chunk.
    pub fn build_messages(&self, chunk: &Chunk) -> Vec<ChatMessage> {
        let system = format!(
            "{} {}",
            prompts::SYSTEM_PROMPT,
            prompts::language_instruction(self.language)
        );

        let source = format!("<<BEGIN_SOURCE>>\n{}\n<<END_SOURCE>>", chunk.text);
        let mut user = self
            .template
            .replace("{num}", &self.per_chunk.to_string())
            .replace("{text}", &source);

        // Difficulty only shapes questions; summaries ignore it.
        if let Some(difficulty) = self.difficulty.filter(|_| self.kind != ItemKind::Summary) {
            user.push_str("\n\n");
            user.push_str(prompts::difficulty_rule(difficulty));
        }

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

impl<C: ChatClient> ChunkGenerator for LlmGenerator<C> {
    #[instrument(skip_all, fields(kind = %self.kind, chunk = chunk.index))]
    async fn generate(&self, chunk: &Chunk) -> Result<Vec<ItemBody>> {
        let messages = self.build_messages(chunk);
        let raw = self.client.chat(&messages, &self.options).await?;
        debug!(response_len = raw.len(), "received completion");

        match self.kind {
            ItemKind::Qa => response::parse_qa_pairs(&raw),
            ItemKind::Cot => response::parse_cot_examples(&raw),
            ItemKind::Summary => response::parse_summary(&raw),
            ItemKind::Conversation => response::parse_conversations(&raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use synthkit_shared::SynthError;

    use super::*;

    /// Replays canned replies and records every request.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedClient {
        fn replying(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }
    }

    impl ChatClient for ScriptedClient {
        async fn chat(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SynthError::Provider("script exhausted".into())))
        }
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 1024,
            chunk_size: 100,
            overlap: 10,
            num_pairs: 10,
            num_cot_examples: 3,
            language: Language::English,
            difficulty: None,
            num_cot_enhance_examples: None,
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            index: 0,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    #[test]
    fn items_per_chunk_pads_small_shares_and_caps_large_ones() {
        assert_eq!(items_per_chunk(25, 5), 7);
        assert_eq!(items_per_chunk(20, 3), 8);
        assert_eq!(items_per_chunk(1, 10), 3);
        assert_eq!(items_per_chunk(100, 2), 50);
        assert_eq!(items_per_chunk(0, 0), 3);
    }

    #[test]
    fn prompt_contains_fenced_source_count_and_language() {
        let mut s = settings();
        s.language = Language::Arabic;
        s.difficulty = Some(Difficulty::Medium);
        let generator = LlmGenerator::new(ScriptedClient::default(), ItemKind::Qa, &s, &PromptsConfig::default())
            .unwrap()
            .with_items_per_chunk(4);

        let messages = generator.build_messages(&chunk("Rust 1.0 shipped in May 2015."));
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.ends_with("Please respond in Arabic."));
        assert!(messages[1].content.starts_with("Create 4 question-answer pairs"));
        assert!(
            messages[1]
                .content
                .contains("<<BEGIN_SOURCE>>\nRust 1.0 shipped in May 2015.\n<<END_SOURCE>>")
        );
        assert!(messages[1].content.contains("combining 2-3 facts"));
    }

    #[test]
    fn placeholders_inside_source_are_left_alone() {
        let prompts = PromptsConfig {
            qa_generation: Some("{num}: {text}".into()),
            ..Default::default()
        };
        let generator = LlmGenerator::new(ScriptedClient::default(), ItemKind::Qa, &settings(), &prompts)
            .unwrap()
            .with_items_per_chunk(2);

        let messages = generator.build_messages(&chunk("literal {num} here"));
        assert_eq!(
            messages[1].content,
            "2: <<BEGIN_SOURCE>>\nliteral {num} here\n<<END_SOURCE>>"
        );
    }

    #[tokio::test]
    async fn parses_qa_reply() {
        let reply = "```json\n[{\"question\": \"When did Rust 1.0 ship?\", \"answer\": \"May 2015\"}]\n```";
        let client = ScriptedClient::replying(vec![Ok(reply.into())]);
        let generator = LlmGenerator::new(client, ItemKind::Qa, &settings(), &PromptsConfig::default()).unwrap();

        let items = generator.generate(&chunk("Rust 1.0 shipped in May 2015.")).await.unwrap();
        assert_eq!(
            items,
            vec![ItemBody::QaPair {
                question: "When did Rust 1.0 ship?".into(),
                answer: "May 2015".into(),
            }]
        );
    }

    #[tokio::test]
    async fn summary_uses_whole_reply() {
        let client = ScriptedClient::replying(vec![Ok("Rust is a language.\n".into())]);
        let generator = LlmGenerator::new(client, ItemKind::Summary, &settings(), &PromptsConfig::default()).unwrap();

        let items = generator.generate(&chunk("...")).await.unwrap();
        assert_eq!(
            items,
            vec![ItemBody::Summary {
                text: "Rust is a language.".into()
            }]
        );
    }

    #[tokio::test]
    async fn unparseable_reply_is_malformed() {
        let client = ScriptedClient::replying(vec![Ok("Sorry, I can't do that.".into())]);
        let generator = LlmGenerator::new(client, ItemKind::Cot, &settings(), &PromptsConfig::default()).unwrap();

        let err = generator.generate(&chunk("text")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let client = ScriptedClient::replying(vec![Err(SynthError::ProviderRejected("401".into()))]);
        let generator = LlmGenerator::new(client, ItemKind::Qa, &settings(), &PromptsConfig::default()).unwrap();

        let err = generator.generate(&chunk("text")).await.unwrap_err();
        assert!(matches!(err, SynthError::ProviderRejected(_)));
    }
}
