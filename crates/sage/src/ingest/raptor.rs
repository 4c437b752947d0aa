//! Hierarchical summary tree construction.
//!
//! Chunks are grouped by the document's own structure: each heading closes
//! the previous group and starts a new one, and every group is condensed into
//! one summary node by the deep-summarization route. Summarization failures
//! degrade to a placeholder node, they never abort ingestion.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{GraphNode, NodeKind, StructuralChunk};
use crate::llm::{ChatClient, LlmRouter, TaskKind};

/// Placeholder summary emitted when the LLM call fails.
const SUMMARY_FALLBACK: &str = "Summary extraction failed.";

/// Builds the per-document summary tree.
pub struct RaptorBuilder {
    router: Arc<LlmRouter>,
}

impl RaptorBuilder {
    #[must_use]
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    /// Walk `chunks` in order and emit one summary node per heading-delimited
    /// group. Node ids are `"{doc_id}-tree-{key}"` where `key` names the
    /// heading that opened the group (`root` for a preamble, `last` for the
    /// final group).
    pub async fn build_tree(&self, doc_id: &str, chunks: &[StructuralChunk]) -> Vec<GraphNode> {
        let client = self.router.route(TaskKind::DeepSummarization);

        let mut nodes = Vec::new();
        let mut group_key = "root".to_string();
        let mut group_level = 0;
        let mut group: Vec<&str> = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.kind == crate::domain::ChunkKind::Heading {
                if !group.is_empty() {
                    let summary = self.summarize_group(client.as_ref(), &group).await;
                    nodes.push(tree_node(doc_id, &group_key, summary, group_level));
                }
                group_key = format!("h-{}-{}", chunk.level, index);
                group_level = chunk.level;
                group.clear();
            }
            group.push(&chunk.content);
        }

        if !group.is_empty() {
            let summary = self.summarize_group(client.as_ref(), &group).await;
            nodes.push(tree_node(doc_id, "last", summary, group_level));
        }

        nodes
    }

    async fn summarize_group(&self, client: &dyn ChatClient, texts: &[&str]) -> String {
        let mut prompt =
            String::from("Summarize the following text segments into a concise overview:\n\n");
        for text in texts {
            prompt.push_str("- ");
            prompt.push_str(text);
            prompt.push('\n');
        }

        match client.generate(&prompt).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "group summarization failed");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

fn tree_node(doc_id: &str, key: &str, text: String, level: i32) -> GraphNode {
    GraphNode {
        id: format!("{doc_id}-tree-{key}"),
        kind: NodeKind::Tree,
        text,
        name: None,
        level: Some(level),
        page_number: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkKind;
    use crate::testing::{router_with_chat, ScriptedChat};

    fn chunk(kind: ChunkKind, level: i32, content: &str) -> StructuralChunk {
        StructuralChunk {
            kind,
            level,
            content: content.to_string(),
            page_number: 0,
        }
    }

    #[tokio::test]
    async fn test_single_heading_emits_one_final_group() {
        let router = router_with_chat(ScriptedChat::always("chapter summary"));
        let builder = RaptorBuilder::new(router);

        let chunks = vec![
            chunk(ChunkKind::Heading, 1, "Ch1"),
            chunk(ChunkKind::Text, 0, "Para A"),
            chunk(ChunkKind::Text, 0, "Para B"),
        ];
        let nodes = builder.build_tree("1", &chunks).await;

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "1-tree-last");
        assert_eq!(nodes[0].text, "chapter summary");
        assert_eq!(nodes[0].kind, NodeKind::Tree);
        assert_eq!(nodes[0].level, Some(1));
    }

    #[tokio::test]
    async fn test_headings_close_previous_groups() {
        let router = router_with_chat(ScriptedChat::always("s"));
        let builder = RaptorBuilder::new(router);

        let chunks = vec![
            chunk(ChunkKind::Text, 0, "Preamble"),
            chunk(ChunkKind::Heading, 1, "Ch1"),
            chunk(ChunkKind::Text, 0, "A"),
            chunk(ChunkKind::Heading, 1, "Ch2"),
            chunk(ChunkKind::Text, 0, "B"),
        ];
        let nodes = builder.build_tree("9", &chunks).await;

        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["9-tree-root", "9-tree-h-1-1", "9-tree-last"]);
    }

    #[tokio::test]
    async fn test_llm_failure_yields_placeholder() {
        let router = router_with_chat(ScriptedChat::always_err("model offline"));
        let builder = RaptorBuilder::new(router);

        let chunks = vec![chunk(ChunkKind::Text, 0, "only text")];
        let nodes = builder.build_tree("2", &chunks).await;

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text, "Summary extraction failed.");
    }

    #[tokio::test]
    async fn test_empty_input_emits_nothing() {
        let router = router_with_chat(ScriptedChat::always("unused"));
        let builder = RaptorBuilder::new(router);
        let nodes = builder.build_tree("3", &[]).await;
        assert!(nodes.is_empty());
    }
}
