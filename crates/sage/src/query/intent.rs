//! Query intent classification and the per-intent engine weight table.

use crate::domain::EngineKind;

/// Coarse intent of a user query, decided by a keyword heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    Summary,
    Definition,
    Relationship,
    Comparison,
    General,
}

impl QueryIntent {
    /// Lowercase label for logs and events.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            QueryIntent::Summary => "summary",
            QueryIntent::Definition => "definition",
            QueryIntent::Relationship => "relationship",
            QueryIntent::Comparison => "comparison",
            QueryIntent::General => "general",
        }
    }
}

/// Keyword-heuristic intent classifier.
///
/// The checks run in declaration order, so a query matching several intents
/// resolves to the first listed one.
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify `query` into exactly one intent.
    #[must_use]
    pub fn classify(query: &str) -> QueryIntent {
        let lower = query.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if contains_any(&["summary", "summarize", "overview", "about"]) {
            QueryIntent::Summary
        } else if contains_any(&["definition", "define", "what is", "meaning"]) {
            QueryIntent::Definition
        } else if contains_any(&["relationship", "connect", "between", "how does"]) {
            QueryIntent::Relationship
        } else if contains_any(&["compare", "difference", "vs", "versus"]) {
            QueryIntent::Comparison
        } else {
            QueryIntent::General
        }
    }
}

/// Per-engine fusion weights for one intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteWeights {
    pub graph: f64,
    pub tree: f64,
    pub vector: f64,
}

impl RouteWeights {
    /// Weight for a specific engine.
    #[must_use]
    pub fn for_engine(&self, engine: EngineKind) -> f64 {
        match engine {
            EngineKind::Graph => self.graph,
            EngineKind::Tree => self.tree,
            EngineKind::Vector => self.vector,
        }
    }
}

/// Default weight applied when an engine has no entry for an intent.
pub const DEFAULT_WEIGHT: f64 = 0.33;

/// Intent → engine weight table.
pub struct RouteOperator;

impl RouteOperator {
    /// The weight triple for `intent`.
    #[must_use]
    pub fn weights(intent: QueryIntent) -> RouteWeights {
        match intent {
            QueryIntent::Summary => RouteWeights {
                graph: 0.20,
                tree: 0.70,
                vector: 0.10,
            },
            QueryIntent::Definition => RouteWeights {
                graph: 0.20,
                tree: 0.10,
                vector: 0.70,
            },
            QueryIntent::Relationship => RouteWeights {
                graph: 0.70,
                tree: 0.10,
                vector: 0.20,
            },
            QueryIntent::Comparison => RouteWeights {
                graph: 0.40,
                tree: 0.40,
                vector: 0.20,
            },
            QueryIntent::General => RouteWeights {
                graph: 0.34,
                tree: 0.33,
                vector: 0.33,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_intent() {
        assert_eq!(
            IntentClassifier::classify("Give me a summary of chapter 3"),
            QueryIntent::Summary
        );
        assert_eq!(
            IntentClassifier::classify("What is this book about?"),
            QueryIntent::Summary
        );
    }

    #[test]
    fn test_definition_intent() {
        assert_eq!(
            IntentClassifier::classify("What is a harpoon?"),
            QueryIntent::Definition
        );
        assert_eq!(
            IntentClassifier::classify("define obsession"),
            QueryIntent::Definition
        );
    }

    #[test]
    fn test_relationship_intent() {
        assert_eq!(
            IntentClassifier::classify("How does Ahab connect to the whale?"),
            QueryIntent::Relationship
        );
    }

    #[test]
    fn test_comparison_intent() {
        assert_eq!(
            IntentClassifier::classify("Ahab vs Starbuck"),
            QueryIntent::Comparison
        );
    }

    #[test]
    fn test_general_fallback() {
        assert_eq!(
            IntentClassifier::classify("Tell me something interesting"),
            QueryIntent::General
        );
    }

    #[test]
    fn test_ties_resolve_by_listed_order() {
        // Matches both summary ("overview") and definition ("what is");
        // summary is listed first.
        assert_eq!(
            IntentClassifier::classify("what is the overview"),
            QueryIntent::Summary
        );
    }

    #[test]
    fn test_weight_table_matches_routing_policy() {
        let w = RouteOperator::weights(QueryIntent::Summary);
        assert_eq!((w.graph, w.tree, w.vector), (0.20, 0.70, 0.10));

        let w = RouteOperator::weights(QueryIntent::Definition);
        assert_eq!((w.graph, w.tree, w.vector), (0.20, 0.10, 0.70));

        let w = RouteOperator::weights(QueryIntent::Relationship);
        assert_eq!((w.graph, w.tree, w.vector), (0.70, 0.10, 0.20));

        let w = RouteOperator::weights(QueryIntent::Comparison);
        assert_eq!((w.graph, w.tree, w.vector), (0.40, 0.40, 0.20));

        let w = RouteOperator::weights(QueryIntent::General);
        assert_eq!((w.graph, w.tree, w.vector), (0.34, 0.33, 0.33));
    }

    #[test]
    fn test_for_engine_lookup() {
        let w = RouteOperator::weights(QueryIntent::Summary);
        assert_eq!(w.for_engine(crate::domain::EngineKind::Tree), 0.70);
        assert_eq!(w.for_engine(crate::domain::EngineKind::Vector), 0.10);
    }
}
