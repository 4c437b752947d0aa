//! Best-effort entity and relation extraction.
//!
//! Each chunk is handed to the light LLM, which answers with a JSON object
//! carrying `entities` and `relations` arrays, possibly wrapped in
//! triple-backtick fences. Malformed JSON degrades to empty lists; only a
//! failed LLM call is surfaced to the caller (who skips the chunk).

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::domain::{Entity, Relation};
use crate::error::Result;
use crate::llm::{LlmRouter, TaskKind};

#[derive(Debug, Default, Deserialize)]
struct Extraction {
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    relations: Vec<Relation>,
}

/// Extracts entities and relations from chunk text.
pub struct GraphExtractor {
    router: Arc<LlmRouter>,
}

impl GraphExtractor {
    #[must_use]
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    /// Ask the light LLM for entities and relations in `text`.
    ///
    /// # Errors
    ///
    /// Only when the LLM call itself fails. Undecodable responses return
    /// empty lists.
    pub async fn extract(&self, text: &str) -> Result<(Vec<Entity>, Vec<Relation>)> {
        let client = self.router.route(TaskKind::SimpleKeywordExtraction);
        let prompt = format!(
            "Extract key entities and their relationships from the following text.\n\
             Respond ONLY with a JSON object containing \"entities\" and \"relations\" arrays.\n\
             Entity: {{ \"name\": \"...\", \"type\": \"...\", \"description\": \"...\" }}\n\
             Relation: {{ \"source\": \"...\", \"target\": \"...\", \"description\": \"...\" }}\n\n\
             Text: {text}"
        );

        let response = client.generate(&prompt).await?;
        let cleaned = strip_code_fences(&response);

        match serde_json::from_str::<Extraction>(cleaned) {
            Ok(extraction) => Ok((extraction.entities, extraction.relations)),
            Err(err) => {
                warn!(error = %err, raw = cleaned, "failed to decode extraction JSON");
                Ok((Vec::new(), Vec::new()))
            }
        }
    }
}

/// Strip a leading ```` ```json ```` (or bare ```` ``` ````) fence and the
/// trailing fence, if present.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_prefix
        .strip_suffix("```")
        .unwrap_or(without_prefix)
        .trim()
}
