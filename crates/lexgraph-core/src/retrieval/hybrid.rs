//! Graph-aware hybrid retriever
//!
//! Flow:
//!     query embedding -> vector search (over-retrieve)
//!                     -> chunk ids
//!     article URN / bridge table -> graph nodes
//!                     -> graph score (shortest path, centrality, density)
//!     final_score = alpha * sim + (1 - alpha) * graph
//!                     -> re-ranked results

use crate::model::{ExpertKind, LinkedNode, NodeUrn};
use crate::retrieval::weights::{self, TraversalWeights};
use crate::retrieval::{RetrievalResult, RetrieverConfig, ALPHA_MAX, ALPHA_MIN};
use crate::storage::graph::{
    node_degree, related_nodes_for_article, shared_neighbour_count, shortest_path, GraphPath,
    GraphStore,
};
use crate::storage::{BridgeStore, VectorStore};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Hybrid retriever combining vector similarity and graph structure.
///
/// Shared by reference across experts; the only mutable state is the
/// learnable alpha parameter, guarded by a mutex.
pub struct GraphAwareRetriever {
    vector_store: Option<Arc<dyn VectorStore>>,
    graph_store: Option<Arc<dyn GraphStore>>,
    bridge: Option<Arc<BridgeStore>>,
    config: RetrieverConfig,
    alpha: Mutex<f64>,
}

impl GraphAwareRetriever {
    pub fn new(
        vector_store: Option<Arc<dyn VectorStore>>,
        graph_store: Option<Arc<dyn GraphStore>>,
        bridge: Option<Arc<BridgeStore>>,
        config: RetrieverConfig,
    ) -> Self {
        tracing::info!(
            alpha = config.alpha,
            over_retrieve = config.over_retrieve_factor,
            max_hops = config.max_graph_hops,
            "GraphAwareRetriever initialized"
        );
        let alpha = config.alpha;
        Self {
            vector_store,
            graph_store,
            bridge,
            config,
            alpha: Mutex::new(alpha),
        }
    }

    /// Current blending coefficient
    pub fn alpha(&self) -> f64 {
        *self.alpha.lock().expect("alpha lock poisoned")
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Hybrid retrieval: vector candidates enriched with graph scores,
    /// re-ranked by the blended score and truncated to `top_k`.
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        context_nodes: &[NodeUrn],
        expert: Option<ExpertKind>,
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        tracing::debug!(
            context_nodes = context_nodes.len(),
            expert = expert.map(|e| e.as_str()),
            top_k,
            "retrieve()"
        );

        let candidates = self
            .vector_search(query_embedding, top_k * self.config.over_retrieve_factor)
            .await;

        tracing::debug!(candidates = candidates.len(), "vector search done");

        let expert_weights = expert.map(weights::for_expert);
        let alpha = self.alpha();

        let mut enriched = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let linked_nodes = self.resolve_nodes(&candidate).await;
            let chunk_nodes: Vec<NodeUrn> = linked_nodes
                .iter()
                .map(|n| n.graph_node_urn.clone())
                .collect();

            let graph_score = self
                .compute_graph_score(&chunk_nodes, context_nodes, expert_weights.as_ref())
                .await;

            let final_score = alpha * candidate.similarity_score + (1.0 - alpha) * graph_score;

            enriched.push(RetrievalResult {
                chunk_id: candidate.chunk_id,
                text: candidate.text,
                similarity_score: candidate.similarity_score,
                graph_score,
                final_score,
                linked_nodes,
                metadata: candidate.metadata,
            });
        }

        // Stable sort keeps vector order for ties
        enriched.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        enriched.truncate(top_k);

        if let Some(first) = enriched.first() {
            tracing::info!(
                results = enriched.len(),
                top_score = first.final_score,
                "retrieve() completed"
            );
        } else {
            tracing::info!("retrieve() returned 0 results");
        }

        enriched
    }

    /// Adjust alpha from community feedback.
    ///
    /// Correlation above 0.5 means the graph score tracks relevance, so alpha
    /// shifts toward the graph; below 0.5 it shifts toward similarity.
    /// Exactly 0.5 leaves alpha untouched. Always clamped to [0.3, 0.9].
    pub fn update_alpha(&self, feedback_correlation: f64, authority: f64) {
        let delta = if feedback_correlation > 0.5 {
            -0.01 * authority
        } else if feedback_correlation < 0.5 {
            0.01 * authority
        } else {
            0.0
        };

        let mut alpha = self.alpha.lock().expect("alpha lock poisoned");
        *alpha = (*alpha + delta).clamp(ALPHA_MIN, ALPHA_MAX);

        tracing::info!(
            alpha = *alpha,
            correlation = feedback_correlation,
            authority,
            "update_alpha()"
        );
    }

    async fn vector_search(&self, query_embedding: &[f32], limit: usize) -> Vec<VectorCandidate> {
        let Some(ref store) = self.vector_store else {
            tracing::warn!("vector store not configured, returning empty results");
            return Vec::new();
        };

        match store
            .query_points(&self.config.collection_name, query_embedding, limit)
            .await
        {
            Ok(points) => points
                .into_iter()
                .map(|p| VectorCandidate {
                    chunk_id: p.id.as_chunk_id(),
                    text: p.text().to_string(),
                    similarity_score: p.score,
                    metadata: p.payload,
                })
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "vector search failed");
                Vec::new()
            }
        }
    }

    /// Resolve the graph nodes a chunk is linked to.
    ///
    /// Prefers the chunk's article URN (queried against the graph directly),
    /// falling back to the bridge table.
    async fn resolve_nodes(&self, candidate: &VectorCandidate) -> Vec<LinkedNode> {
        let article_urn = candidate
            .metadata
            .get("article_urn")
            .and_then(Value::as_str)
            .unwrap_or("");

        if !article_urn.is_empty() {
            if let Some(ref graph) = self.graph_store {
                match related_nodes_for_article(graph.as_ref(), article_urn, 10).await {
                    Ok(nodes) if !nodes.is_empty() => {
                        return nodes
                            .into_iter()
                            .map(|n| LinkedNode {
                                graph_node_urn: NodeUrn(n.node_urn),
                                node_type: n.node_label,
                                relation_type: Some(n.rel_type),
                                direction: Some(n.direction),
                                confidence: None,
                            })
                            .collect();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(article_urn, error = %e, "article neighbourhood lookup failed");
                    }
                }
            }
        }

        match self.bridge {
            Some(ref bridge) => match bridge.get_nodes_for_chunk(&candidate.chunk_id) {
                Ok(mappings) => mappings.iter().map(LinkedNode::from).collect(),
                Err(e) => {
                    tracing::debug!(chunk_id = %candidate.chunk_id, error = %e, "bridge lookup failed");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Graph-based relevance score with fallback strategies:
    /// 1. no context nodes -> centrality of the chunk node
    /// 2. context nodes -> best shortest-path score over all pairs
    /// 3. no path found -> relation density via shared neighbours
    async fn compute_graph_score(
        &self,
        chunk_nodes: &[NodeUrn],
        context_nodes: &[NodeUrn],
        expert_weights: Option<&TraversalWeights>,
    ) -> f64 {
        if !self.config.enable_graph_enrichment {
            return self.config.default_graph_score;
        }

        let Some(ref graph) = self.graph_store else {
            return self.config.default_graph_score;
        };

        if chunk_nodes.is_empty() {
            return self.config.default_graph_score;
        }

        if context_nodes.is_empty() {
            return self.centrality_score(graph.as_ref(), &chunk_nodes[0]).await;
        }

        let mut max_score: f64 = 0.0;
        for chunk_node in chunk_nodes {
            for context_node in context_nodes {
                let path = match shortest_path(
                    graph.as_ref(),
                    chunk_node,
                    context_node,
                    self.config.max_graph_hops,
                )
                .await
                {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::debug!(
                            source = %chunk_node, target = %context_node, error = %e,
                            "shortest path lookup failed"
                        );
                        None
                    }
                };

                if let Some(path) = path {
                    max_score = max_score.max(score_path(&path, expert_weights));
                }
            }
        }

        if max_score == 0.0 {
            return self
                .relation_density(graph.as_ref(), chunk_nodes, context_nodes)
                .await;
        }

        max_score
    }

    /// Centrality by node degree: min(degree / 10, 1.0), floored at 0.2 for
    /// an existing node.
    async fn centrality_score(&self, graph: &dyn GraphStore, node: &NodeUrn) -> f64 {
        match node_degree(graph, node).await {
            Ok(Some(degree)) => ((degree as f64 / 10.0).min(1.0)).max(0.2),
            // Node missing from the graph: weak neutral signal
            Ok(None) => 0.3,
            Err(e) => {
                tracing::debug!(node = %node, error = %e, "centrality computation failed");
                self.config.default_graph_score
            }
        }
    }

    /// Shared-neighbour density: min(shared / 5, 0.8), floored at 0.2.
    /// Capped below a direct path because indirect correlation is weaker
    /// evidence.
    async fn relation_density(
        &self,
        graph: &dyn GraphStore,
        chunk_nodes: &[NodeUrn],
        context_nodes: &[NodeUrn],
    ) -> f64 {
        match shared_neighbour_count(graph, chunk_nodes, context_nodes).await {
            Ok(shared) => ((shared as f64 / 5.0).min(0.8)).max(0.2),
            Err(e) => {
                tracing::debug!(error = %e, "relation density computation failed");
                0.2
            }
        }
    }
}

/// Path score: (1 / (length + 1)) * product of relation weights
fn score_path(path: &GraphPath, expert_weights: Option<&TraversalWeights>) -> f64 {
    let distance_score = 1.0 / (path.length as f64 + 1.0);

    let relation_bonus = match expert_weights {
        Some(weights) => path
            .edges
            .iter()
            .map(|e| weights.get(&e.edge_type))
            .product(),
        None => 1.0,
    };

    distance_score * relation_bonus
}

struct VectorCandidate {
    chunk_id: uuid::Uuid,
    text: String,
    similarity_score: f64,
    metadata: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::storage::graph::GraphEdge;
    use crate::storage::{PointId, ScoredPoint};
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    struct FixedVectors(Vec<ScoredPoint>);

    #[async_trait]
    impl VectorStore for FixedVectors {
        async fn query_points(
            &self,
            _collection: &str,
            _query_vector: &[f32],
            limit: usize,
        ) -> Result<Vec<ScoredPoint>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct FailingVectors;

    #[async_trait]
    impl VectorStore for FailingVectors {
        async fn query_points(
            &self,
            _collection: &str,
            _query_vector: &[f32],
            _limit: usize,
        ) -> Result<Vec<ScoredPoint>> {
            Err(crate::error::LexGraphError::VectorStore(
                "connection refused".to_string(),
            ))
        }
    }

    /// Canned graph: answers degree queries with `degree`, shortest-path
    /// queries with `path_rows`, shared-neighbour queries with `shared`.
    struct CannedGraph {
        degree: Option<u64>,
        path_rows: Vec<Value>,
        shared: u64,
    }

    #[async_trait]
    impl GraphStore for CannedGraph {
        async fn query(&self, cypher: &str, _params: Value) -> Result<Vec<Value>> {
            if cypher.contains("AS degree") {
                Ok(self
                    .degree
                    .map(|d| vec![json!({"degree": d})])
                    .unwrap_or_default())
            } else if cypher.contains("shortestPath") {
                Ok(self.path_rows.clone())
            } else if cypher.contains("AS cnt") {
                Ok(vec![json!({"cnt": self.shared})])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn point(score: f64, urn: &str) -> ScoredPoint {
        ScoredPoint {
            id: PointId::Uuid(Uuid::new_v4()),
            score,
            payload: json!({"text": "Art. 1453 c.c.", "article_urn": urn, "source_type": "norma"}),
        }
    }

    fn retriever(
        vectors: Option<Arc<dyn VectorStore>>,
        graph: Option<Arc<dyn GraphStore>>,
    ) -> GraphAwareRetriever {
        GraphAwareRetriever::new(vectors, graph, None, RetrieverConfig::default())
    }

    #[tokio::test]
    async fn vector_failure_degrades_to_empty() {
        let r = retriever(Some(Arc::new(FailingVectors)), None);
        let results = r.retrieve(&[0.1; 4], &[], None, 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn no_vector_store_is_empty() {
        let r = retriever(None, None);
        assert!(r.retrieve(&[0.1; 4], &[], None, 5).await.is_empty());
    }

    #[tokio::test]
    async fn final_score_matches_formula_and_order() {
        let graph = CannedGraph {
            degree: Some(5),
            path_rows: vec![],
            shared: 0,
        };
        let r = retriever(
            Some(Arc::new(FixedVectors(vec![
                point(0.4, "urn:a"),
                point(0.9, "urn:b"),
            ]))),
            Some(Arc::new(graph)),
        );

        let results = r.retrieve(&[0.1; 4], &[], None, 10).await;
        assert_eq!(results.len(), 2);

        // Sorted descending by final_score
        assert!(results[0].final_score >= results[1].final_score);

        for res in &results {
            let expected = 0.7 * res.similarity_score + 0.3 * res.graph_score;
            assert!((res.final_score - expected).abs() <= 1e-9);
        }
    }

    #[tokio::test]
    async fn degree_zero_node_gets_floor() {
        let graph = CannedGraph {
            degree: Some(0),
            path_rows: vec![],
            shared: 0,
        };
        let r = retriever(None, Some(Arc::new(graph)));
        let score = r
            .compute_graph_score(
                &[NodeUrn::from("urn:norma:cc:art1453")],
                &[],
                None,
            )
            .await;
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unreachable_context_uses_density_fallback() {
        let graph = CannedGraph {
            degree: Some(4),
            path_rows: vec![],
            shared: 2,
        };
        let r = retriever(None, Some(Arc::new(graph)));
        let score = r
            .compute_graph_score(
                &[NodeUrn::from("urn:a")],
                &[NodeUrn::from("urn:b")],
                None,
            )
            .await;
        // 2 shared neighbours -> 0.4, within [0.2, 0.8]
        assert!((score - 0.4).abs() < 1e-9);
        assert!((0.2..=0.8).contains(&score));
    }

    #[tokio::test]
    async fn path_score_uses_expert_weights() {
        let graph = CannedGraph {
            degree: None,
            path_rows: vec![json!({
                "path": {"edges": [{"type": "interpreta"}], "length": 1}
            })],
            shared: 0,
        };
        let r = retriever(None, Some(Arc::new(graph)));
        let weights = weights::for_expert(ExpertKind::Precedent);
        let score = r
            .compute_graph_score(
                &[NodeUrn::from("urn:sentenza:1")],
                &[NodeUrn::from("urn:norma:cc:art1453")],
                Some(&weights),
            )
            .await;
        // (1 / (1 + 1)) * 1.0 = 0.5
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn score_path_multiplies_edge_weights() {
        let path = GraphPath {
            source: NodeUrn::from("urn:a"),
            target: NodeUrn::from("urn:b"),
            edges: vec![
                GraphEdge {
                    edge_type: "contiene".to_string(),
                    properties: Value::Null,
                },
                GraphEdge {
                    edge_type: "cita".to_string(),
                    properties: Value::Null,
                },
            ],
            length: 2,
        };
        let weights = weights::for_expert(ExpertKind::Literal);
        // (1/3) * 1.0 * 0.75
        let expected = (1.0 / 3.0) * 0.75;
        assert!((score_path(&path, Some(&weights)) - expected).abs() < 1e-9);
    }

    #[test]
    fn update_alpha_adapts_and_clamps() {
        let r = retriever(None, None);
        assert!((r.alpha() - 0.70).abs() < 1e-9);

        // High correlation: graph is useful, shift toward graph
        r.update_alpha(0.9, 1.0);
        assert!((r.alpha() - 0.69).abs() < 1e-9);

        // Low correlation: shift back toward similarity
        r.update_alpha(-0.5, 1.0);
        assert!((r.alpha() - 0.70).abs() < 1e-9);

        // Zero authority: no movement
        r.update_alpha(0.9, 0.0);
        assert!((r.alpha() - 0.70).abs() < 1e-9);

        // Exactly 0.5 is a no-op
        r.update_alpha(0.5, 1.0);
        assert!((r.alpha() - 0.70).abs() < 1e-9);
    }

    #[test]
    fn update_alpha_respects_bounds() {
        let mut settings = crate::config::RetrieverSettings::default();
        settings.alpha = 0.89;
        let config = RetrieverConfig::from_settings(&settings).unwrap();
        let r = GraphAwareRetriever::new(None, None, None, config);

        for _ in 0..10 {
            r.update_alpha(0.0, 1.0); // push upward
        }
        assert!(r.alpha() <= ALPHA_MAX + 1e-12);

        let mut settings = crate::config::RetrieverSettings::default();
        settings.alpha = 0.31;
        let config = RetrieverConfig::from_settings(&settings).unwrap();
        let r = GraphAwareRetriever::new(None, None, None, config);

        for _ in 0..10 {
            r.update_alpha(0.9, 1.0); // push downward
        }
        assert!(r.alpha() >= ALPHA_MIN - 1e-12);
    }
}
