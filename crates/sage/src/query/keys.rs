//! Dual-level key extraction: specific entities for the vector engine,
//! broader themes for the graph engine.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::ingest::extractor::strip_code_fences;
use crate::llm::{LlmRouter, TaskKind};

/// Extracted keys at two levels of abstraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchKeys {
    /// Low-level keys: names and specific terms.
    #[serde(default)]
    pub entities: Vec<String>,
    /// High-level keys: themes and topics.
    #[serde(default)]
    pub themes: Vec<String>,
}

/// Extracts [`SearchKeys`] from a query via the light LLM.
pub struct DualKeyExtractor {
    router: Arc<LlmRouter>,
}

impl DualKeyExtractor {
    #[must_use]
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    /// Extract entities and themes from `query`.
    ///
    /// LLM failure yields empty keys; malformed JSON falls back to the
    /// whitespace-split tokens of the query as entities. Never errors.
    pub async fn extract(&self, query: &str) -> SearchKeys {
        let client = self.router.route(TaskKind::SimpleKeywordExtraction);
        let prompt = format!(
            "Extract specific entities (names, terms) and broader themes or topics from the user query.\n\
             Respond ONLY with a JSON object containing \"entities\" and \"themes\" arrays.\n\n\
             Query: {query}"
        );

        let response = match client.generate(&prompt).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "key extraction failed, continuing without keys");
                return SearchKeys::default();
            }
        };

        let cleaned = strip_code_fences(&response);
        match serde_json::from_str::<SearchKeys>(cleaned) {
            Ok(keys) => keys,
            Err(_) => SearchKeys {
                entities: query.split_whitespace().map(str::to_string).collect(),
                themes: Vec::new(),
            },
        }
    }
}
