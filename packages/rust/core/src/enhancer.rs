//! Chain-of-thought enhancement of existing conversation datasets.
//!
//! Every conversation is sent to the model on its own and replaced by the
//! rewritten version, whose assistant turns reason step by step. QA datasets
//! are first turned into system/user/assistant conversations. A conversation
//! whose call keeps failing is written back unchanged and recorded.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use synthkit_provider::{ChatClient, ChatMessage, CompletionOptions};
use synthkit_shared::{
    ChatTurn, Dataset, EnhanceReport, GeneratedItem, GenerationSettings, ItemBody, ItemKind, Language,
    PromptsConfig, Result, SkippedUnit, SynthError,
};

use crate::progress::ProgressReporter;
use crate::prompts;
use crate::response;
use crate::retry::RetryPolicy;

/// System turn given to QA pairs when they become conversations.
pub const QA_SYSTEM_TURN: &str = "You are a helpful AI assistant that provides accurate, detailed responses.";

/// Rewrites one conversation.
pub trait ConversationEnhancer: Send + Sync {
    fn enhance(&self, turns: &[ChatTurn]) -> impl Future<Output = Result<Vec<ChatTurn>>> + Send;
}

impl<E: ConversationEnhancer> ConversationEnhancer for &E {
    fn enhance(&self, turns: &[ChatTurn]) -> impl Future<Output = Result<Vec<ChatTurn>>> + Send {
        (**self).enhance(turns)
    }
}

// ---------------------------------------------------------------------------
// LLM-backed enhancer
// ---------------------------------------------------------------------------

pub struct LlmEnhancer<C> {
    client: C,
    template: String,
    language: Language,
    options: CompletionOptions,
}

impl<C: ChatClient> LlmEnhancer<C> {
    /// Fails if a configured template override lacks `{conversations}`.
    pub fn new(client: C, settings: &GenerationSettings, prompts: &PromptsConfig) -> Result<Self> {
        Ok(Self {
            client,
            template: prompts::enhancement_template(prompts)?,
            language: settings.language,
            options: CompletionOptions {
                temperature: settings.temperature,
                top_p: Some(settings.top_p),
                max_tokens: settings.max_tokens,
            },
        })
    }

    pub fn build_messages(&self, turns: &[ChatTurn]) -> Result<Vec<ChatMessage>> {
        let rendered = serde_json::to_string_pretty(turns)
            .map_err(|e| SynthError::validation(format!("cannot render conversation: {e}")))?;
        let system = format!(
            "{} {}",
            prompts::SYSTEM_PROMPT,
            prompts::language_instruction(self.language)
        );
        let user = self.template.replace("{conversations}", &rendered);
        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }
}

impl<C: ChatClient> ConversationEnhancer for LlmEnhancer<C> {
    #[instrument(skip_all, fields(turns = turns.len()))]
    async fn enhance(&self, turns: &[ChatTurn]) -> Result<Vec<ChatTurn>> {
        let messages = self.build_messages(turns)?;
        let raw = self.client.chat(&messages, &self.options).await?;
        debug!(response_len = raw.len(), "received completion");
        response::parse_enhanced_turns(&raw)
    }
}

// ---------------------------------------------------------------------------
// Dataset pass
// ---------------------------------------------------------------------------

/// Rewritten dataset plus run statistics.
#[derive(Debug)]
pub struct EnhanceOutcome {
    pub dataset: Dataset,
    pub report: EnhanceReport,
}

/// Applies a [`ConversationEnhancer`] to every conversation of a dataset.
#[derive(Debug, Clone)]
pub struct CotEnhancer {
    retry: RetryPolicy,
    cancel: CancellationToken,
    limit: Option<usize>,
}

impl CotEnhancer {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            cancel: CancellationToken::new(),
            limit: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Keep only the first `limit` conversations; `None` keeps all.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[instrument(skip_all, fields(items = dataset.len(), kind = %dataset.kind()))]
    pub async fn run<E: ConversationEnhancer>(
        &self,
        enhancer: &E,
        dataset: Dataset,
        progress: &dyn ProgressReporter,
    ) -> Result<EnhanceOutcome> {
        let source = dataset.source().to_string();
        let mut conversations = as_conversations(dataset)?;
        if let Some(limit) = self.limit {
            conversations.truncate(limit);
        }

        let total = conversations.len();
        let mut report = EnhanceReport {
            total,
            ..Default::default()
        };
        let mut out: Vec<GeneratedItem> = Vec::with_capacity(total);
        progress.phase("Enhancing");

        let mut pending = conversations.into_iter().enumerate();
        for (index, (chunk_index, turns)) in pending.by_ref() {
            if self.cancel.is_cancelled() {
                warn!(conversation = index, "enhancement cancelled");
                report.cancelled = true;
                out.push(conversation(chunk_index, turns));
                break;
            }

            let outcome = self.retry.run(&self.cancel, || enhancer.enhance(&turns)).await;
            match outcome.result {
                Ok(enhanced) => {
                    report.enhanced += 1;
                    out.push(conversation(chunk_index, enhanced));
                }
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        conversation = index,
                        attempts = outcome.attempts,
                        error = %err,
                        "keeping conversation unchanged"
                    );
                    report.kept_original.push(SkippedUnit {
                        index,
                        attempts: outcome.attempts,
                        reason: err.to_string(),
                    });
                    out.push(conversation(chunk_index, turns));
                    if outcome.cancelled {
                        report.cancelled = true;
                        break;
                    }
                }
            }

            progress.unit_done(index + 1, total, &format!("{} enhanced", report.enhanced));
        }
        // Conversations never reached because of cancellation stay as they were.
        out.extend(pending.map(|(_, (chunk_index, turns))| conversation(chunk_index, turns)));

        info!(
            total = report.total,
            enhanced = report.enhanced,
            unchanged = report.kept_original.len(),
            "enhancement finished"
        );
        progress.done(&format!("Enhanced {} of {} conversations", report.enhanced, report.total));

        Ok(EnhanceOutcome {
            dataset: Dataset::from_items(ItemKind::Conversation, source, out)?,
            report,
        })
    }
}

fn conversation(chunk_index: usize, messages: Vec<ChatTurn>) -> GeneratedItem {
    GeneratedItem::new(chunk_index, ItemBody::Conversation { messages })
}

/// Conversations of a QA or conversation dataset, with their chunk index.
pub fn as_conversations(dataset: Dataset) -> Result<Vec<(usize, Vec<ChatTurn>)>> {
    let kind = dataset.kind();
    dataset
        .into_items()
        .into_iter()
        .map(|item| match item.body {
            ItemBody::Conversation { messages } => Ok((item.chunk_index, messages)),
            ItemBody::QaPair { question, answer } => Ok((
                item.chunk_index,
                vec![
                    ChatTurn::new("system", QA_SYSTEM_TURN),
                    ChatTurn::new("user", question),
                    ChatTurn::new("assistant", answer),
                ],
            )),
            _ => Err(SynthError::validation(format!(
                "cot-enhance needs a QA or conversation dataset, got {kind}"
            ))),
        })
        .collect()
}
