//! Graph store contract and typed query helpers
//!
//! The core issues a small, fixed set of cypher-like query shapes against the
//! knowledge graph: 1-hop neighbourhood, variable-length shortest path, node
//! degree, shared-neighbour count between node sets, and article expansion.
//! The store itself is an external collaborator reached through `query`.

use crate::error::{LexGraphError, Result};
use crate::model::NodeUrn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Cypher-like query capability consumed by the core
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a parametrised query and return result rows as JSON objects
    async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Value>>;
}

/// Edge of a path in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(rename = "type", default)]
    pub edge_type: String,
    #[serde(default)]
    pub properties: Value,
}

/// Path between two nodes, used for graph scoring
#[derive(Debug, Clone)]
pub struct GraphPath {
    pub source: NodeUrn,
    pub target: NodeUrn,
    pub edges: Vec<GraphEdge>,
    pub length: usize,
}

/// Node in the neighbourhood of an article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedNode {
    #[serde(default)]
    pub node_urn: String,
    #[serde(default)]
    pub node_label: String,
    #[serde(default)]
    pub rel_type: String,
    #[serde(default)]
    pub direction: String,
}

/// 1-hop neighbourhood of an article node, limited to `max_results` rows.
pub async fn related_nodes_for_article(
    store: &dyn GraphStore,
    article_urn: &str,
    max_results: usize,
) -> Result<Vec<RelatedNode>> {
    let cypher = "MATCH (art:Norma {URN: $urn})-[r]-(x) \
                  RETURN x.URN AS node_urn, labels(x)[0] AS node_label, \
                         type(r) AS rel_type, \
                         CASE WHEN startNode(r) = art THEN 'outgoing' ELSE 'incoming' END AS direction \
                  LIMIT $limit";
    let rows = store
        .query(cypher, json!({"urn": article_urn, "limit": max_results}))
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect())
}

/// Shortest path between two nodes, up to `max_hops` edges.
///
/// Returns `None` when no path exists within the bound.
pub async fn shortest_path(
    store: &dyn GraphStore,
    source: &NodeUrn,
    target: &NodeUrn,
    max_hops: usize,
) -> Result<Option<GraphPath>> {
    let cypher = format!(
        "MATCH (a {{URN: $source}}), (b {{URN: $target}}), \
         p = shortestPath((a)-[r*1..{}]-(b)) RETURN p AS path",
        max_hops
    );
    let rows = store
        .query(
            &cypher,
            json!({"source": source.as_str(), "target": target.as_str()}),
        )
        .await?;

    let Some(path_value) = rows.first().and_then(|row| row.get("path")) else {
        return Ok(None);
    };

    let edges: Vec<GraphEdge> = path_value
        .get("edges")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let length = path_value
        .get("length")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(edges.len());

    Ok(Some(GraphPath {
        source: source.clone(),
        target: target.clone(),
        edges,
        length,
    }))
}

/// Degree (relation count) of a node, for centrality scoring.
///
/// Returns `None` when the node does not exist.
pub async fn node_degree(store: &dyn GraphStore, urn: &NodeUrn) -> Result<Option<usize>> {
    let cypher = "MATCH (n {URN: $urn})--() RETURN count(*) AS degree";
    let rows = store.query(cypher, json!({"urn": urn.as_str()})).await?;

    Ok(rows
        .first()
        .and_then(|row| row.get("degree"))
        .and_then(Value::as_u64)
        .map(|n| n as usize))
}

/// Count of distinct shared 1-hop neighbours between two node sets.
///
/// Each side is capped at 3 nodes to bound the query.
pub async fn shared_neighbour_count(
    store: &dyn GraphStore,
    chunk_nodes: &[NodeUrn],
    context_nodes: &[NodeUrn],
) -> Result<usize> {
    let chunks: Vec<&str> = chunk_nodes.iter().take(3).map(NodeUrn::as_str).collect();
    let contexts: Vec<&str> = context_nodes.iter().take(3).map(NodeUrn::as_str).collect();

    let cypher = "UNWIND $chunks AS c UNWIND $contexts AS x \
                  MATCH (a {URN: c})--(shared)--(b {URN: x}) \
                  RETURN count(DISTINCT shared) AS cnt";
    let rows = store
        .query(cypher, json!({"chunks": chunks, "contexts": contexts}))
        .await?;

    Ok(rows
        .first()
        .and_then(|row| row.get("cnt"))
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(0))
}

/// HTTP client for a graph gateway exposing a cypher query endpoint
pub struct HttpGraphStore {
    http_client: reqwest::Client,
    base_url: String,
    graph_name: String,
}

#[derive(Serialize)]
struct GraphQueryRequest<'a> {
    graph: &'a str,
    query: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct GraphQueryResponse {
    #[serde(default)]
    rows: Vec<Value>,
}

impl HttpGraphStore {
    pub fn new(base_url: impl Into<String>, graph_name: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(LexGraphError::Http)?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            graph_name: graph_name.into(),
        })
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Value>> {
        let url = format!("{}/query", self.base_url);
        let body = GraphQueryRequest {
            graph: &self.graph_name,
            query: cypher,
            params,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(LexGraphError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LexGraphError::GraphStore(format!(
                "graph query failed (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: GraphQueryResponse = response.json().await.map_err(LexGraphError::Http)?;
        Ok(parsed.rows)
    }
}
