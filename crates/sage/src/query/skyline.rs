//! Pareto (skyline) pruning of fused results.
//!
//! Each result is projected onto two axes: a vector-similarity axis (the
//! fused score, with a slight bias for vector-sourced results) and a graph-
//! relevance axis (a fixed bonus for graph-sourced results). A result
//! strictly worse than another on both axes is dominated and dropped.

use tracing::debug;

use crate::domain::{EngineKind, SearchResult};

/// Skyline ranker over fused search results.
pub struct SkylineRanker;

impl SkylineRanker {
    /// Remove dominated results and sort the survivors by fused score
    /// descending. Inputs of length ≤ 1 pass through untouched.
    #[must_use]
    pub fn rank(results: Vec<SearchResult>) -> Vec<SearchResult> {
        if results.len() <= 1 {
            return results;
        }

        let axes: Vec<(f32, f32)> = results.iter().map(|r| Self::project(r)).collect();

        let total = results.len();
        let mut skyline: Vec<SearchResult> = Vec::with_capacity(total);
        for (i, result) in results.into_iter().enumerate() {
            let dominated = axes.iter().enumerate().any(|(j, other)| {
                i != j && other.0 > axes[i].0 && other.1 > axes[i].1
            });
            if !dominated {
                skyline.push(result);
            }
        }

        skyline.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(total, kept = skyline.len(), "skyline pruning complete");
        skyline
    }

    /// Project a result onto (vector axis, graph axis).
    fn project(result: &SearchResult) -> (f32, f32) {
        let vector_axis = if result.source == EngineKind::Vector {
            result.score * 1.2
        } else {
            result.score
        };
        let graph_axis = if result.source == EngineKind::Graph {
            0.8
        } else {
            0.5
        };
        (vector_axis, graph_axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f32, source: EngineKind) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            content: id.to_string(),
            score,
            source,
        }
    }

    #[test]
    fn test_singleton_passes_through() {
        let input = vec![result("a", 0.4, EngineKind::Vector)];
        assert_eq!(SkylineRanker::rank(input.clone()), input);
    }

    #[test]
    fn test_dominated_result_is_dropped() {
        // The graph result is strictly better on both axes: 0.9 > 0.1 on
        // the vector axis and 0.8 > 0.5 on the graph axis.
        let input = vec![
            result("low", 0.1, EngineKind::Tree),
            result("high", 0.9, EngineKind::Graph),
        ];
        let out = SkylineRanker::rank(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "high");
    }

    #[test]
    fn test_equal_graph_axis_never_dominates() {
        // Vector and tree results share the graph-axis floor, so strict
        // domination is impossible between them regardless of score.
        let input = vec![
            result("low", 0.1, EngineKind::Tree),
            result("high", 0.9, EngineKind::Vector),
        ];
        let out = SkylineRanker::rank(input);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_graph_bonus_protects_low_scores() {
        // The graph result loses on the vector axis but wins on the graph
        // axis, so neither dominates the other.
        let input = vec![
            result("g", 0.2, EngineKind::Graph),
            result("v", 0.9, EngineKind::Vector),
        ];
        let out = SkylineRanker::rank(input);
        assert_eq!(out.len(), 2);
        // Sorted by fused score descending.
        assert_eq!(out[0].id, "v");
    }

    #[test]
    fn test_no_surviving_pair_is_dominated() {
        let input = vec![
            result("a", 0.9, EngineKind::Vector),
            result("b", 0.5, EngineKind::Graph),
            result("c", 0.3, EngineKind::Tree),
            result("d", 0.8, EngineKind::Graph),
            result("e", 0.1, EngineKind::Vector),
        ];
        let out = SkylineRanker::rank(input);

        for a in &out {
            for b in &out {
                let pa = SkylineRanker::project(a);
                let pb = SkylineRanker::project(b);
                assert!(
                    !(pb.0 > pa.0 && pb.1 > pa.1),
                    "{} dominates {} but both survived",
                    b.id,
                    a.id
                );
            }
        }
    }

    #[test]
    fn test_survivors_sorted_by_score() {
        let input = vec![
            result("b", 0.5, EngineKind::Graph),
            result("a", 0.9, EngineKind::Graph),
        ];
        let out = SkylineRanker::rank(input);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[1].id, "b");
    }
}
