//! Self-RAG critique: retrieval relevance and generation support checks.
//!
//! Both evaluations ride the light LLM and fail open: a broken critique
//! must never block an answer. Verdict parsing accepts both the natural
//! style (`"Fully Supported"`) and the snake_case style (`fully_supported`);
//! underscores are normalized to spaces before matching.

use std::sync::Arc;

use tracing::debug;

use crate::llm::{LlmRouter, TaskKind};

/// How well an answer is grounded in its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportLevel {
    Full,
    Partial,
    None,
}

impl SupportLevel {
    /// Human-readable label for events.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            SupportLevel::Full => "Fully Supported",
            SupportLevel::Partial => "Partially Supported",
            SupportLevel::None => "No Support",
        }
    }
}

/// Evaluates retrieval relevance and generation grounding.
pub struct SelfRagCritique {
    router: Arc<LlmRouter>,
}

impl SelfRagCritique {
    #[must_use]
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    /// Whether `context` is relevant to `query`. Fails open: an LLM error
    /// keeps the context.
    pub async fn evaluate_retrieval(&self, query: &str, context: &str) -> bool {
        let client = self.router.route(TaskKind::SimpleKeywordExtraction);
        let prompt = format!(
            "Determine if the following context is relevant to answering the question.\n\
             Respond with ONLY one word: \"Relevant\" or \"Irrelevant\".\n\n\
             Question: {query}\n\n\
             Context: {}\n\n\
             Verdict:",
            truncate(context, 500)
        );

        match client.generate(&prompt).await {
            Ok(response) => {
                let verdict = response.trim().to_lowercase();
                let relevant = verdict.contains("relevant") && !verdict.contains("irrelevant");
                debug!(verdict = %verdict, relevant, "retrieval critique");
                relevant
            }
            Err(err) => {
                debug!(error = %err, "retrieval critique failed, defaulting to relevant");
                true
            }
        }
    }

    /// How well `answer` is supported by `context`. An LLM error defaults to
    /// partial support.
    pub async fn evaluate_generation(&self, answer: &str, context: &str) -> SupportLevel {
        let client = self.router.route(TaskKind::SimpleKeywordExtraction);
        let prompt = format!(
            "Evaluate whether the answer is factually supported by the context.\n\
             Respond with ONLY one of: \"Fully Supported\", \"Partially Supported\", or \"No Support\".\n\n\
             Context: {}\n\n\
             Answer: {}\n\n\
             Support Level:",
            truncate(context, 500),
            truncate(answer, 300)
        );

        match client.generate(&prompt).await {
            Ok(response) => {
                let verdict = response.trim().to_lowercase().replace('_', " ");
                debug!(verdict = %verdict, "generation critique");
                if verdict.contains("fully") {
                    SupportLevel::Full
                } else if verdict.contains("no support") {
                    SupportLevel::None
                } else {
                    SupportLevel::Partial
                }
            }
            Err(err) => {
                debug!(error = %err, "generation critique failed, defaulting to partial");
                SupportLevel::Partial
            }
        }
    }
}

/// Character-bounded truncation with an ellipsis marker.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
