//! The agentic generation loop.
//!
//! Chain-of-Retrieval decomposition, per-sub-query fusion retrieval with a
//! relevance critique, context-grounded generation, and a support critique
//! with one bounded regeneration. Progress is streamed as ordered events to
//! a sink that closes exactly once; consumers treat closure as
//! end-of-answer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::fusion::FusionRetriever;
use super::self_rag::{SelfRagCritique, SupportLevel};
use crate::llm::{LlmRouter, TaskKind};

/// Appended on regeneration when the draft had no support.
const REGENERATE_DIRECTIVE: &str =
    "\n\nIMPORTANT: Base your answer STRICTLY on the provided context.";

/// Event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reasoning,
    Source,
    Answer,
    Error,
}

/// One event in the generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
}

impl GeneratorEvent {
    #[must_use]
    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Reasoning,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn source(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Source,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Answer,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            content: content.into(),
        }
    }
}

/// Orchestrates the full answer pipeline and streams its progress.
pub struct AgenticGenerator {
    router: Arc<LlmRouter>,
    retriever: Arc<FusionRetriever>,
    critique: SelfRagCritique,
}

impl AgenticGenerator {
    pub fn new(router: Arc<LlmRouter>, retriever: Arc<FusionRetriever>) -> Self {
        let critique = SelfRagCritique::new(Arc::clone(&router));
        Self {
            router,
            retriever,
            critique,
        }
    }

    /// Run the pipeline for `query`, emitting ordered events into `sink`.
    ///
    /// The sink is closed exactly once, when this function returns. A
    /// dropped receiver stops generation at the next emission.
    pub async fn generate_answer(&self, query: &str, sink: mpsc::Sender<GeneratorEvent>) {
        info!(query, "starting agentic generation");

        // Step 1: Chain-of-Retrieval decomposition.
        if !emit(&sink, GeneratorEvent::reasoning("[CoR] Analyzing query complexity...")).await {
            return;
        }
        let sub_queries = self.decompose_query(query).await;
        if sub_queries.len() > 1
            && !emit(
                &sink,
                GeneratorEvent::reasoning(format!(
                    "[CoR] Decomposed into {} sub-queries",
                    sub_queries.len()
                )),
            )
            .await
        {
            return;
        }

        // Steps 2 and 3: per-sub-query retrieval with relevance critique.
        let mut context_chunks: Vec<String> = Vec::new();
        for (i, sub_query) in sub_queries.iter().enumerate() {
            let event = GeneratorEvent::reasoning(format!(
                "[Fusion] Searching for sub-query {}/{}: {}",
                i + 1,
                sub_queries.len(),
                truncate(sub_query, 80)
            ));
            if !emit(&sink, event).await {
                return;
            }

            let results = match self.retriever.retrieve(sub_query).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %err, "sub-query retrieval failed");
                    let event =
                        GeneratorEvent::reasoning(format!("[Fusion] Search warning: {err}"));
                    if !emit(&sink, event).await {
                        return;
                    }
                    continue;
                }
            };

            for result in results {
                if !self
                    .critique
                    .evaluate_retrieval(sub_query, &result.content)
                    .await
                {
                    let event = GeneratorEvent::reasoning(format!(
                        "[Self-RAG] Filtered irrelevant result from {}",
                        result.source.label()
                    ));
                    if !emit(&sink, event).await {
                        return;
                    }
                    continue;
                }

                let event = GeneratorEvent::source(format!(
                    "[{}] (score: {:.2}) {}",
                    result.source.label(),
                    result.score,
                    truncate(&result.content, 200)
                ));
                if !emit(&sink, event).await {
                    return;
                }
                context_chunks.push(result.content);
            }
        }

        let event = GeneratorEvent::reasoning(format!(
            "[Agent] {} relevant context chunks after Self-RAG filtering.",
            context_chunks.len()
        ));
        if !emit(&sink, event).await {
            return;
        }

        // Step 4: context-grounded generation on the heavy route.
        if !emit(&sink, GeneratorEvent::reasoning("[Agent] Generating answer...")).await {
            return;
        }
        let client = self.router.route(TaskKind::AgenticReasoning);
        let prompt = build_rag_prompt(query, &context_chunks);

        let mut answer = match client.generate(&prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                let _ = emit(&sink, GeneratorEvent::error(format!("generation failed: {err}"))).await;
                return;
            }
        };

        // Step 5: support critique with one bounded regeneration.
        if !context_chunks.is_empty() {
            let joined = context_chunks.join("\n\n");
            let support = self.critique.evaluate_generation(&answer, &joined).await;
            let event = GeneratorEvent::reasoning(format!(
                "[Self-RAG] Support level: {}",
                support.label()
            ));
            if !emit(&sink, event).await {
                return;
            }

            if support == SupportLevel::None {
                let event = GeneratorEvent::reasoning(
                    "[Self-RAG] Answer not supported by context. Regenerating...",
                );
                if !emit(&sink, event).await {
                    return;
                }

                answer = match client.generate(&format!("{prompt}{REGENERATE_DIRECTIVE}")).await {
                    Ok(answer) => answer,
                    Err(err) => {
                        let _ = emit(
                            &sink,
                            GeneratorEvent::error(format!("regeneration failed: {err}")),
                        )
                        .await;
                        return;
                    }
                };
            }
        }

        let _ = emit(&sink, GeneratorEvent::answer(answer)).await;
        info!("agentic generation complete");
    }

    /// Break a compound query into 2-3 sub-queries, or echo it when simple.
    /// Lines of at most 5 characters are discarded; an empty outcome falls
    /// back to the original query.
    async fn decompose_query(&self, query: &str) -> Vec<String> {
        let client = self.router.route(TaskKind::SimpleKeywordExtraction);
        let prompt = format!(
            "Analyze this question. If it contains multiple distinct information needs, \
             decompose it into 2-3 simpler sub-questions. If it's already simple, return it as-is.\n\n\
             Return ONLY the questions, one per line. No numbering, no explanations.\n\n\
             Question: {query}"
        );

        let response = match client.generate(&prompt).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "decomposition failed, using original query");
                return vec![query.to_string()];
            }
        };

        let sub_queries: Vec<String> = response
            .lines()
            .map(str::trim)
            .filter(|line| line.len() > 5)
            .map(str::to_string)
            .collect();

        if sub_queries.is_empty() {
            vec![query.to_string()]
        } else {
            sub_queries
        }
    }
}

/// Send one event; false means the receiver is gone and generation should
/// stop.
async fn emit(sink: &mpsc::Sender<GeneratorEvent>, event: GeneratorEvent) -> bool {
    sink.send(event).await.is_ok()
}

/// The literal RAG prompt format. Without context it degrades to a plain
/// best-effort instruction.
#[must_use]
pub fn build_rag_prompt(query: &str, context_chunks: &[String]) -> String {
    if context_chunks.is_empty() {
        return format!("Answer the following question to the best of your ability:\n\n{query}");
    }

    let mut prompt = String::from(
        "You are a helpful assistant that answers questions based on the provided context.\n\
         Use ONLY the information in the context to answer. If the context doesn't contain the answer, say so.\n\n\
         === CONTEXT ===\n",
    );
    for (i, chunk) in context_chunks.iter().enumerate() {
        prompt.push_str(&format!("[Source {}]\n{}\n\n", i + 1, chunk));
    }
    prompt.push_str("=== QUESTION ===\n");
    prompt.push_str(query);
    prompt.push_str("\n\n=== ANSWER ===\n");
    prompt
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
