//! Search tools: semantic retrieval and graph traversal

use crate::error::{LexGraphError, Result};
use crate::llm::Embedder;
use crate::model::{ExpertKind, NodeUrn};
use crate::retrieval::GraphAwareRetriever;
use crate::storage::GraphStore;
use crate::tools::{
    arg_str, arg_str_vec, arg_usize, ParameterKind, Tool, ToolArgs, ToolParameter,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Semantic search over the legal knowledge graph via the hybrid retriever
pub struct SemanticSearchTool {
    retriever: Option<Arc<GraphAwareRetriever>>,
    embedder: Option<Arc<dyn Embedder>>,
    default_top_k: usize,
    default_expert: Option<ExpertKind>,
}

impl SemanticSearchTool {
    pub fn new(
        retriever: Option<Arc<GraphAwareRetriever>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            retriever,
            embedder,
            default_top_k: 5,
            default_expert: None,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn with_default_expert(mut self, expert: ExpertKind) -> Self {
        self.default_expert = Some(expert);
        self
    }
}

#[async_trait]
impl Tool for SemanticSearchTool {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn description(&self) -> &str {
        "Semantic search over the legal knowledge graph: hybrid vector similarity plus graph structure scoring"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("query", ParameterKind::String, "Search query text"),
            ToolParameter::optional("top_k", ParameterKind::Integer, "Number of results")
                .with_default(json!(5)),
            ToolParameter::optional(
                "source_types",
                ParameterKind::Array,
                "Restrict results to these source types (norma, massima, ratio, ...)",
            ),
            ToolParameter::optional(
                "expert_type",
                ParameterKind::String,
                "Interpretive canon whose traversal weights drive graph scoring",
            )
            .with_enum(vec![
                json!("literal"),
                json!("systemic"),
                json!("principles"),
                json!("precedent"),
            ]),
            ToolParameter::optional(
                "context_nodes",
                ParameterKind::Array,
                "Graph node URNs from the query context",
            ),
            ToolParameter::optional(
                "min_score",
                ParameterKind::Number,
                "Drop results below this final score",
            ),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value> {
        let Some(ref embedder) = self.embedder else {
            return Err(LexGraphError::Config(
                "SemanticSearchTool requires an Embedder".to_string(),
            ));
        };
        let Some(ref retriever) = self.retriever else {
            return Err(LexGraphError::Config(
                "SemanticSearchTool requires a Retriever".to_string(),
            ));
        };

        let query = arg_str(&args, "query").unwrap_or_default();
        let top_k = arg_usize(&args, "top_k").unwrap_or(self.default_top_k);
        let expert = arg_str(&args, "expert_type")
            .and_then(ExpertKind::parse)
            .or(self.default_expert);
        let context_nodes: Vec<NodeUrn> = arg_str_vec(&args, "context_nodes")
            .unwrap_or_default()
            .into_iter()
            .map(NodeUrn)
            .collect();
        let source_types = arg_str_vec(&args, "source_types");
        let min_score = crate::tools::arg_f64(&args, "min_score");

        let embedding = embedder.embed(query).await?;
        let results = retriever
            .retrieve(&embedding, &context_nodes, expert, top_k)
            .await;

        let items: Vec<Value> = results
            .iter()
            .filter(|r| match source_types {
                Some(ref types) => r
                    .source_type()
                    .map(|st| types.iter().any(|t| t == st))
                    .unwrap_or(false),
                None => true,
            })
            .filter(|r| min_score.map(|m| r.final_score >= m).unwrap_or(true))
            .map(|r| {
                json!({
                    "chunk_id": r.chunk_id.to_string(),
                    "text": r.text,
                    "similarity_score": r.similarity_score,
                    "graph_score": r.graph_score,
                    "final_score": r.final_score,
                    "source_type": r.source_type(),
                    "metadata": r.metadata,
                })
            })
            .collect();

        Ok(json!({
            "total": items.len(),
            "results": items,
        }))
    }
}

/// Graph traversal from a start node along selected relation types
pub struct GraphSearchTool {
    graph: Option<Arc<dyn GraphStore>>,
    default_max_hops: usize,
}

impl GraphSearchTool {
    pub fn new(graph: Option<Arc<dyn GraphStore>>) -> Self {
        Self {
            graph,
            default_max_hops: 2,
        }
    }

    pub fn with_default_max_hops(mut self, max_hops: usize) -> Self {
        self.default_max_hops = max_hops;
        self
    }
}

/// Build the traversal query for a neighbourhood expansion.
///
/// Direction picks the arrow; relation types restrict the edge set.
pub fn build_traversal_query(
    start_node: &str,
    relation_types: Option<&[String]>,
    max_hops: usize,
    direction: &str,
    target_type: Option<&str>,
) -> (String, Value) {
    let rel_filter = match relation_types {
        Some(types) if !types.is_empty() => format!(":{}", types.join("|")),
        _ => String::new(),
    };

    let pattern = match direction {
        "outgoing" => format!("-[r{}*1..{}]->", rel_filter, max_hops),
        "incoming" => format!("<-[r{}*1..{}]-", rel_filter, max_hops),
        _ => format!("-[r{}*1..{}]-", rel_filter, max_hops),
    };

    let target = match target_type {
        Some(label) => format!("(x:{})", label),
        None => "(x)".to_string(),
    };

    let cypher = format!(
        "MATCH (start {{URN: $start_urn}}){}{} RETURN DISTINCT x AS node, last(r) AS rel LIMIT 50",
        pattern, target
    );

    (cypher, json!({"start_urn": start_node}))
}

fn node_to_dict(node: &Value) -> Value {
    let mut properties = Map::new();
    let mut urn = String::new();
    let mut node_type = String::new();

    if let Some(obj) = node.as_object() {
        for (key, value) in obj {
            match key.as_str() {
                "URN" => urn = value.as_str().unwrap_or_default().to_string(),
                "_type" => node_type = value.as_str().unwrap_or_default().to_string(),
                _ => {
                    properties.insert(key.clone(), value.clone());
                }
            }
        }
    }

    json!({
        "urn": urn,
        "type": node_type,
        "properties": properties,
    })
}

fn edge_to_dict(edge: &Value) -> Value {
    let mut properties = Map::new();
    let mut edge_type = String::new();

    if let Some(obj) = edge.as_object() {
        for (key, value) in obj {
            if key == "type" {
                edge_type = value.as_str().unwrap_or_default().to_string();
            } else {
                properties.insert(key.clone(), value.clone());
            }
        }
    }

    json!({
        "type": edge_type,
        "properties": properties,
    })
}

#[async_trait]
impl Tool for GraphSearchTool {
    fn name(&self) -> &str {
        "graph_search"
    }

    fn description(&self) -> &str {
        "Knowledge-graph traversal: expand the neighbourhood of a node along selected relation types"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("start_node", ParameterKind::String, "Start node URN"),
            ToolParameter::optional(
                "relation_types",
                ParameterKind::Array,
                "Relation types to follow (others are excluded)",
            ),
            ToolParameter::optional("max_hops", ParameterKind::Integer, "Maximum path length")
                .with_default(json!(2)),
            ToolParameter::optional("direction", ParameterKind::String, "Traversal direction")
                .with_default(json!("both"))
                .with_enum(vec![json!("outgoing"), json!("incoming"), json!("both")]),
            ToolParameter::optional(
                "target_type",
                ParameterKind::String,
                "Restrict reached nodes to this label",
            ),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value> {
        let Some(ref graph) = self.graph else {
            return Err(LexGraphError::Config(
                "GraphSearchTool requires a graph store".to_string(),
            ));
        };

        let start_node = arg_str(&args, "start_node").unwrap_or_default();
        let max_hops = arg_usize(&args, "max_hops").unwrap_or(self.default_max_hops);
        if !(1..=5).contains(&max_hops) {
            return Err(LexGraphError::InvalidInput(format!(
                "max_hops must be in [1, 5], got {}",
                max_hops
            )));
        }

        let relation_types = arg_str_vec(&args, "relation_types");
        let direction = arg_str(&args, "direction").unwrap_or("both");
        let target_type = arg_str(&args, "target_type");

        let (cypher, params) = build_traversal_query(
            start_node,
            relation_types.as_deref(),
            max_hops,
            direction,
            target_type,
        );

        let rows = graph.query(&cypher, params).await?;

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for row in &rows {
            if let Some(node) = row.get("node") {
                nodes.push(node_to_dict(node));
            }
            if let Some(rel) = row.get("rel") {
                edges.push(edge_to_dict(rel));
            }
        }

        Ok(json!({
            "total_nodes": nodes.len(),
            "total_edges": edges.len(),
            "nodes": nodes,
            "edges": edges,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::run_tool;
    use std::sync::Mutex;

    struct FakeGraph {
        rows: Vec<Value>,
        last_query: Mutex<Option<(String, Value)>>,
    }

    #[async_trait]
    impl GraphStore for FakeGraph {
        async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Value>> {
            *self.last_query.lock().unwrap() = Some((cypher.to_string(), params));
            Ok(self.rows.clone())
        }
    }

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn traversal_query_outgoing() {
        let (cypher, params) =
            build_traversal_query("urn:test", None, 2, "outgoing", None);
        assert!(cypher.contains("->"));
        assert_eq!(params["start_urn"], "urn:test");
    }

    #[test]
    fn traversal_query_incoming() {
        let (cypher, _) = build_traversal_query("urn:test", None, 2, "incoming", None);
        assert!(cypher.contains("<-"));
    }

    #[test]
    fn traversal_query_both() {
        let (cypher, _) = build_traversal_query("urn:test", None, 2, "both", None);
        assert!(cypher.contains("-[r*"));
        assert!(!cypher.contains("->"));
        assert!(!cypher.contains("<-"));
    }

    #[test]
    fn traversal_query_with_relations_and_target() {
        let types = vec!["disciplina".to_string(), "cita".to_string()];
        let (cypher, _) = build_traversal_query(
            "urn:test",
            Some(&types),
            2,
            "both",
            Some("ConcettoGiuridico"),
        );
        assert!(cypher.contains("disciplina|cita"));
        assert!(cypher.contains("ConcettoGiuridico"));
    }

    #[test]
    fn node_and_edge_conversion() {
        let node = json!({"URN": "urn:test", "_type": "Norma", "titolo": "Test"});
        let converted = node_to_dict(&node);
        assert_eq!(converted["urn"], "urn:test");
        assert_eq!(converted["type"], "Norma");
        assert_eq!(converted["properties"]["titolo"], "Test");

        let edge = json!({"type": "disciplina", "weight": 0.9});
        let converted = edge_to_dict(&edge);
        assert_eq!(converted["type"], "disciplina");
        assert!((converted["properties"]["weight"].as_f64().unwrap() - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn graph_search_without_store_fails() {
        let tool = GraphSearchTool::new(None);
        let result = run_tool(&tool, args(&[("start_node", json!("urn:norma:cp:art52"))])).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("graph store"));
    }

    #[tokio::test]
    async fn graph_search_rejects_bad_hops() {
        let graph = Arc::new(FakeGraph {
            rows: vec![],
            last_query: Mutex::new(None),
        });
        let tool = GraphSearchTool::new(Some(graph));
        let result = run_tool(
            &tool,
            args(&[
                ("start_node", json!("urn:norma:cp:art52")),
                ("max_hops", json!(9)),
            ]),
        )
        .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("max_hops"));
    }

    #[tokio::test]
    async fn graph_search_counts_nodes_and_edges() {
        let graph = Arc::new(FakeGraph {
            rows: vec![
                json!({
                    "node": {"URN": "urn:concetto:legittima_difesa", "_type": "ConcettoGiuridico"},
                    "rel": {"type": "disciplina"},
                }),
                json!({
                    "node": {"URN": "urn:norma:cp:art55", "_type": "Norma"},
                    "rel": {"type": "cita"},
                }),
            ],
            last_query: Mutex::new(None),
        });
        let tool = GraphSearchTool::new(Some(graph.clone()));

        let result = run_tool(
            &tool,
            args(&[
                ("start_node", json!("urn:norma:cp:art52")),
                ("relation_types", json!(["disciplina", "cita"])),
                ("max_hops", json!(2)),
            ]),
        )
        .await;

        assert!(result.success);
        assert_eq!(result.data["total_nodes"], 2);
        assert_eq!(result.data["total_edges"], 2);

        let (cypher, _) = graph.last_query.lock().unwrap().clone().unwrap();
        assert!(cypher.contains("disciplina|cita"));
    }

    #[tokio::test]
    async fn graph_search_incoming_direction_in_query() {
        let graph = Arc::new(FakeGraph {
            rows: vec![],
            last_query: Mutex::new(None),
        });
        let tool = GraphSearchTool::new(Some(graph.clone()));

        let result = run_tool(
            &tool,
            args(&[
                ("start_node", json!("urn:norma:cp:art52")),
                ("direction", json!("incoming")),
            ]),
        )
        .await;
        assert!(result.success);

        let (cypher, _) = graph.last_query.lock().unwrap().clone().unwrap();
        assert!(cypher.contains("<-"));
    }

    #[tokio::test]
    async fn semantic_search_without_embedder_fails() {
        let tool = SemanticSearchTool::new(None, None);
        let result = run_tool(&tool, args(&[("query", json!("test"))])).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Embedder"));
    }
}
