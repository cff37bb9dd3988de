//! Built-in prompt templates.
//!
//! Generation templates take `{num}` (items requested) and `{text}` (the
//! fenced source chunk). The rating template takes `{items}` and the
//! enhancement template `{conversations}`. Any of them can be replaced from
//! the `[prompts]` config section.

use synthkit_shared::{Difficulty, ItemKind, Language, PromptsConfig, Result, SynthError};

pub const QA_GENERATION: &str = r#"Create {num} question-answer pairs from the source text below.

Rules:
1. Every question must be answerable from the source text alone.
2. Answers must be accurate, complete and self-contained.
3. Cover the most important facts and do not repeat a question.

SOURCE_TEXT:
{text}

Return JSON array only, in this format:
[
  {"question": "...", "answer": "..."}
]"#;

pub const COT_GENERATION: &str = r#"Create {num} reasoning examples from the source text below.
Each example has a question that needs several steps to answer, the step-by-step
reasoning that leads to the answer, and the final answer.

SOURCE_TEXT:
{text}

Return JSON array only, in this format:
[
  {"question": "...", "reasoning": "Step 1: ... Step 2: ...", "answer": "..."}
]"#;

pub const SUMMARY: &str = r#"Summarize the source text below in 3-5 sentences.
Focus on the main topic, the key facts and any conclusions.

SOURCE_TEXT:
{text}

Return the summary as plain text, without a preamble."#;

pub const CONVERSATION_GENERATION: &str = r#"Create {num} short conversations between a user and an assistant about the source text below.
Each conversation has 2-3 user turns, and every assistant turn must be grounded in the text.

SOURCE_TEXT:
{text}

Return JSON array only. Each element is one conversation, a list of messages:
[
  [
    {"role": "user", "content": "..."},
    {"role": "assistant", "content": "..."}
  ]
]"#;

pub const QA_RATING: &str = r#"Rate each of the following training examples for quality on a scale from 0 to 10.

Consider:
- accuracy: is the answer correct and supported?
- relevance: is the example useful for teaching the topic?
- clarity: is it unambiguous and well written?

EXAMPLES:
{items}

Return JSON array only, one entry per example, using the example's index:
[
  {"index": 0, "score": 8, "rationale": "..."}
]"#;

pub const COT_ENHANCEMENT: &str = r#"Rewrite the conversation below so that every assistant turn shows its reasoning step by step before giving the answer.
Keep system and user turns unchanged. Keep the number and order of turns.
Include simple steps even when the answer is easy.

CONVERSATION:
{conversations}

Return JSON array only, the rewritten conversation as a list of messages:
[
  {"role": "user", "content": "..."},
  {"role": "assistant", "content": "Let me think through this step by step: ..."}
]"#;

pub const SYSTEM_PROMPT: &str = "You are a careful data creation assistant for LLM training.";

/// Generation template for `kind`, preferring a configured override.
pub fn generation_template(kind: ItemKind, prompts: &PromptsConfig) -> Result<String> {
    let (custom, builtin, key) = match kind {
        ItemKind::Qa => (&prompts.qa_generation, QA_GENERATION, "qa_generation"),
        ItemKind::Cot => (&prompts.cot_generation, COT_GENERATION, "cot_generation"),
        ItemKind::Summary => (&prompts.summary, SUMMARY, "summary"),
        ItemKind::Conversation => (
            &prompts.conversation_generation,
            CONVERSATION_GENERATION,
            "conversation_generation",
        ),
    };
    let template = custom.clone().unwrap_or_else(|| builtin.to_string());
    require_placeholder(&template, "{text}", key)?;
    Ok(template)
}

/// Rating template, preferring a configured override.
pub fn rating_template(prompts: &PromptsConfig) -> Result<String> {
    let template = prompts.qa_rating.clone().unwrap_or_else(|| QA_RATING.to_string());
    require_placeholder(&template, "{items}", "qa_rating")?;
    Ok(template)
}

/// Chain-of-thought enhancement template, preferring a configured override.
pub fn enhancement_template(prompts: &PromptsConfig) -> Result<String> {
    let template = prompts
        .cot_enhancement
        .clone()
        .unwrap_or_else(|| COT_ENHANCEMENT.to_string());
    require_placeholder(&template, "{conversations}", "cot_enhancement")?;
    Ok(template)
}

fn require_placeholder(template: &str, placeholder: &str, key: &str) -> Result<()> {
    if template.contains(placeholder) {
        Ok(())
    } else {
        Err(SynthError::config(format!(
            "prompts.{key} must contain the {placeholder} placeholder"
        )))
    }
}

pub fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::English => "Please respond in English.",
        Language::Arabic => "Please respond in Arabic.",
        Language::Source => "Please respond in the same language as the provided text.",
    }
}

pub fn difficulty_rule(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Write straightforward, factual questions answerable with a single span from the text. \
             Use concrete nouns and exact phrases present in the chunk."
        }
        Difficulty::Medium => {
            "Write questions that require combining 2-3 facts from the text. \
             Prefer dates, quantities, named entities, and causality explicitly stated."
        }
        Difficulty::Advanced => {
            "Write multi-step questions that synthesize multiple details across sentences. \
             Cite names, dates, figures, or technical terms directly from the text in the answers."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_have_placeholders() {
        let prompts = PromptsConfig::default();
        for kind in [ItemKind::Qa, ItemKind::Cot, ItemKind::Summary, ItemKind::Conversation] {
            assert!(generation_template(kind, &prompts).unwrap().contains("{text}"));
        }
        assert!(rating_template(&prompts).unwrap().contains("{items}"));
    }

    #[test]
    fn override_without_text_placeholder_is_rejected() {
        let prompts = PromptsConfig {
            qa_generation: Some("Make {num} pairs.".into()),
            ..Default::default()
        };
        let err = generation_template(ItemKind::Qa, &prompts).unwrap_err();
        assert!(err.to_string().contains("prompts.qa_generation"));
    }

    #[test]
    fn override_is_used() {
        let prompts = PromptsConfig {
            summary: Some("TL;DR: {text}".into()),
            ..Default::default()
        };
        assert_eq!(generation_template(ItemKind::Summary, &prompts).unwrap(), "TL;DR: {text}");
    }
}
