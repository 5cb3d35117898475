//! Context-constrained answer generation.
//!
//! Builds a prompt that restricts the model to the retrieved contexts and
//! calls the chat completion service at low temperature so scoring stays
//! close to reproducible.

use crate::config::DEFAULT_CHAT_MODEL;
use crate::error::Result;
use crate::llm::{ChatClient, ChatOptions, Message};
use serde::{Deserialize, Serialize};

/// Fixed refusal phrase. Also substituted when the completion service
/// returns empty text, so `answer` is never empty downstream.
pub const REFUSAL: &str = "I don't know based on the provided context.";

/// Provider tag recorded in usage metadata.
pub const PROVIDER: &str = "groq";

/// Known-deprecated model names redirected to a supported equivalent, so
/// stale configuration does not hard-fail the pipeline.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("llama-3.1-70b-versatile", "llama-3.3-70b-versatile"),
    ("llama-3.1-8b-instant", "llama-3.3-70b-versatile"),
];

/// Resolve the chat model name: explicit override, then the configured
/// default, then the static fallback; deprecation aliases applied last.
pub fn resolve_model(override_model: Option<&str>, configured: &str) -> String {
    let chosen = override_model
        .filter(|m| !m.is_empty())
        .unwrap_or(if configured.is_empty() {
            DEFAULT_CHAT_MODEL
        } else {
            configured
        });

    for (stale, replacement) in MODEL_ALIASES {
        if chosen == *stale {
            return replacement.to_string();
        }
    }
    chosen.to_string()
}

/// Token usage and provenance for one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub model: String,
    pub provider: String,
}

/// Result of one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub answer: String,
    pub usage: UsageInfo,
}

/// Stage seam used by the evaluation harness; lets tests run the harness
/// against a fake generator.
pub trait AnswerGenerator {
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<GenerationOutcome>;
}

/// Generates answers through the chat completion service.
pub struct Generator<'a> {
    client: &'a ChatClient,
    model_override: Option<String>,
}

impl<'a> Generator<'a> {
    pub fn new(client: &'a ChatClient) -> Self {
        Self {
            client,
            model_override: None,
        }
    }

    /// Force a specific model instead of the configured default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    fn resolved_model(&self) -> String {
        resolve_model(self.model_override.as_deref(), self.client.configured_model())
    }
}

impl AnswerGenerator for Generator<'_> {
    /// Generate an answer for `question` strictly from `contexts`.
    ///
    /// Transport or model failures propagate; this stage does not retry.
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<GenerationOutcome> {
        let model = self.resolved_model();
        let options = ChatOptions {
            model: model.clone(),
            ..self.client.default_options()
        };

        let messages = vec![
            Message::system("Answer strictly from the provided context."),
            Message::user(build_prompt(question, contexts)),
        ];

        let response = self.client.chat_with(messages, &options).await?;

        let mut answer = response.content.trim().to_string();
        if answer.is_empty() {
            answer = REFUSAL.to_string();
        }

        let usage = response.usage;
        Ok(GenerationOutcome {
            answer,
            usage: UsageInfo {
                prompt_tokens: usage.as_ref().and_then(|u| u.prompt_tokens),
                completion_tokens: usage.as_ref().and_then(|u| u.completion_tokens),
                total_tokens: usage.as_ref().and_then(|u| u.total_tokens),
                model,
                provider: PROVIDER.to_string(),
            },
        })
    }
}

/// Build the context-constrained user prompt: bulleted contexts, the
/// refusal instruction, the question, and a three-sentence cap.
pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    let ctx = contexts
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a precise assistant. Answer ONLY using the context below.\n\
         If the answer is not in the context, reply: \"{}\"\n\n\
         Context:\n{}\n\n\
         Question: {}\n\
         Give a concise answer (<= 3 sentences).",
        REFUSAL, ctx, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_contexts_and_question() {
        let contexts = vec!["first passage".to_string(), "second passage".to_string()];
        let prompt = build_prompt("What is X?", &contexts);

        assert!(prompt.contains("- first passage"));
        assert!(prompt.contains("- second passage"));
        assert!(prompt.contains("Question: What is X?"));
        assert!(prompt.contains(REFUSAL));
        assert!(prompt.contains("3 sentences"));
    }

    #[test]
    fn test_prompt_with_no_contexts() {
        let prompt = build_prompt("What is X?", &[]);
        assert!(prompt.contains("Context:\n\n"));
        assert!(prompt.contains("Question: What is X?"));
    }

    #[test]
    fn test_model_resolution_order() {
        // Override wins.
        assert_eq!(
            resolve_model(Some("custom-model"), "configured-model"),
            "custom-model"
        );
        // Configured default next.
        assert_eq!(resolve_model(None, "configured-model"), "configured-model");
        // Static fallback last.
        assert_eq!(resolve_model(None, ""), DEFAULT_CHAT_MODEL);
        assert_eq!(resolve_model(Some(""), ""), DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_deprecated_models_redirected() {
        assert_eq!(
            resolve_model(Some("llama-3.1-70b-versatile"), ""),
            "llama-3.3-70b-versatile"
        );
        assert_eq!(
            resolve_model(None, "llama-3.1-8b-instant"),
            "llama-3.3-70b-versatile"
        );
    }
}
