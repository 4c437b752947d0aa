//! Assembly of the per-document graph payload.
//!
//! Combines the Document root, its Chunk children, RAPTOR tree nodes, and
//! the extracted semantic layer (entities plus relations) into one node/edge
//! set. All ids are deterministic, so re-ingesting a document upserts the
//! same graph rather than duplicating it.

use crate::domain::{ChunkPoint, EdgeKind, Entity, GraphEdge, GraphNode, NodeKind, Relation};

/// Stateless builder for the graph store payload.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Build the full node and edge set for one document.
    ///
    /// Structure edges: `(Document)-[:HAS_CHUNK]->(Chunk)` per chunk and
    /// `(Chunk)-[:NEXT_CHUNK]->(Chunk)` between neighbours. Semantic edges:
    /// `(Entity)-[:GT_LINK]->(Document)` per entity and
    /// `(Entity)-[:RELATED_TO {desc}]->(Entity)` per relation.
    #[must_use]
    pub fn build(
        doc_id: &str,
        title: &str,
        chunks: &[ChunkPoint],
        tree_nodes: Vec<GraphNode>,
        entities: &[Entity],
        relations: &[Relation],
    ) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let mut nodes = Vec::with_capacity(2 + chunks.len() + tree_nodes.len() + entities.len());
        let mut edges = Vec::new();

        nodes.push(GraphNode {
            id: doc_id.to_string(),
            kind: NodeKind::Document,
            text: title.to_string(),
            name: Some(title.to_string()),
            level: None,
            page_number: None,
        });

        for (index, chunk) in chunks.iter().enumerate() {
            nodes.push(GraphNode {
                id: chunk.chunk_id.clone(),
                kind: NodeKind::Chunk,
                text: chunk.text.clone(),
                name: None,
                level: None,
                page_number: Some(chunk.page_number),
            });
            edges.push(GraphEdge {
                from: doc_id.to_string(),
                to: chunk.chunk_id.clone(),
                kind: EdgeKind::HasChunk,
                description: None,
            });
            if index > 0 {
                edges.push(GraphEdge {
                    from: chunks[index - 1].chunk_id.clone(),
                    to: chunk.chunk_id.clone(),
                    kind: EdgeKind::NextChunk,
                    description: None,
                });
            }
        }

        nodes.extend(tree_nodes);

        for relation in relations {
            edges.push(GraphEdge {
                from: Entity::id_for(doc_id, &relation.source),
                to: Entity::id_for(doc_id, &relation.target),
                kind: EdgeKind::RelatedTo,
                description: Some(relation.description.clone()),
            });
        }

        for entity in entities {
            let entity_id = Entity::id_for(doc_id, &entity.name);
            nodes.push(GraphNode {
                id: entity_id.clone(),
                kind: NodeKind::Entity,
                text: entity.description.clone(),
                name: Some(entity.name.clone()),
                level: None,
                page_number: None,
            });
            edges.push(GraphEdge {
                from: entity_id,
                to: doc_id.to_string(),
                kind: EdgeKind::GtLink,
                description: None,
            });
        }

        (nodes, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkKind;

    fn point(doc_id: &str, index: usize, text: &str) -> ChunkPoint {
        ChunkPoint {
            chunk_id: ChunkPoint::id_for(doc_id, index),
            text: text.to_string(),
            vector: vec![0.0; 4],
            page_number: 1,
            kind: ChunkKind::Text,
        }
    }

    #[test]
    fn test_document_root_and_chunk_edges() {
        let chunks = vec![point("1", 0, "A"), point("1", 1, "B"), point("1", 2, "C")];
        let (nodes, edges) = GraphBuilder::build("1", "T", &chunks, vec![], &[], &[]);

        assert_eq!(nodes[0].kind, NodeKind::Document);
        assert_eq!(nodes[0].id, "1");
        assert_eq!(
            nodes.iter().filter(|n| n.kind == NodeKind::Chunk).count(),
            3
        );

        let has_chunk: Vec<_> = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::HasChunk)
            .collect();
        assert_eq!(has_chunk.len(), 3);
        assert!(has_chunk.iter().all(|e| e.from == "1"));

        let next: Vec<_> = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::NextChunk)
            .collect();
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].from, "1-chunk-0");
        assert_eq!(next[0].to, "1-chunk-1");
    }

    #[test]
    fn test_entities_link_to_document() {
        let entities = vec![Entity {
            name: "Ahab".into(),
            kind: "person".into(),
            description: "captain".into(),
        }];
        let relations = vec![Relation {
            source: "Ahab".into(),
            target: "Pequod".into(),
            description: "commands".into(),
        }];
        let (nodes, edges) = GraphBuilder::build("7", "T", &[], vec![], &entities, &relations);

        let entity_node = nodes
            .iter()
            .find(|n| n.kind == NodeKind::Entity)
            .expect("entity node");
        assert_eq!(entity_node.id, "7-ent-Ahab");
        assert_eq!(entity_node.name.as_deref(), Some("Ahab"));

        let gt_link = edges
            .iter()
            .find(|e| e.kind == EdgeKind::GtLink)
            .expect("gt link");
        assert_eq!(gt_link.from, "7-ent-Ahab");
        assert_eq!(gt_link.to, "7");

        let related = edges
            .iter()
            .find(|e| e.kind == EdgeKind::RelatedTo)
            .expect("relation edge");
        assert_eq!(related.from, "7-ent-Ahab");
        assert_eq!(related.to, "7-ent-Pequod");
        assert_eq!(related.description.as_deref(), Some("commands"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let chunks = vec![point("5", 0, "A")];
        let first = GraphBuilder::build("5", "T", &chunks, vec![], &[], &[]);
        let second = GraphBuilder::build("5", "T", &chunks, vec![], &[], &[]);
        assert_eq!(first, second);
    }
}
