//! Task-kind routing over capability-tagged LLM clients.
//!
//! Two chat backends are registered: a light local generator for high-volume
//! work (keyword extraction, critique) and a heavy generator for agentic
//! reasoning and deep summarization. A distinct embedding client is routed
//! from the same place. Routing is pure: no state, no I/O.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Cognitive category of an LLM workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Embedding,
    SimpleKeywordExtraction,
    AgenticReasoning,
    DeepSummarization,
    MultimodalParsing,
}

/// Single-shot text completion. No partial results.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Backend name, for logs.
    fn name(&self) -> &str;
}

/// Dense-vector generation: one vector per input, same order, equal
/// dimension.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed `texts`, preserving input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Backend name, for logs.
    fn name(&self) -> &str;
}

/// Routes a [`TaskKind`] to the right backend.
///
/// In `local_only` mode the heavy route is substituted with the local client;
/// all other routing is preserved.
pub struct LlmRouter {
    local: Arc<dyn ChatClient>,
    heavy: Arc<dyn ChatClient>,
    embedder: Arc<dyn EmbeddingClient>,
    local_only: bool,
}

impl LlmRouter {
    /// Create a router over the given backends.
    pub fn new(
        local: Arc<dyn ChatClient>,
        heavy: Arc<dyn ChatClient>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            local,
            heavy,
            embedder,
            local_only: false,
        }
    }

    /// Substitute the heavy route with the local client.
    #[must_use]
    pub fn with_local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    /// Select the chat backend for `task`.
    ///
    /// Unknown kinds fall back to the local client for cost and safety.
    #[must_use]
    pub fn route(&self, task: TaskKind) -> Arc<dyn ChatClient> {
        let selected = match task {
            TaskKind::Embedding | TaskKind::SimpleKeywordExtraction => Arc::clone(&self.local),
            TaskKind::AgenticReasoning
            | TaskKind::DeepSummarization
            | TaskKind::MultimodalParsing => {
                if self.local_only {
                    Arc::clone(&self.local)
                } else {
                    Arc::clone(&self.heavy)
                }
            }
        };
        debug!(task = ?task, backend = selected.name(), "routing llm task");
        selected
    }

    /// The embedding backend.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn EmbeddingClient> {
        Arc::clone(&self.embedder)
    }
}
