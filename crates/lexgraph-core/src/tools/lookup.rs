//! Lookup tools: legal definitions and normative hierarchy

use crate::error::{LexGraphError, Result};
use crate::storage::GraphStore;
use crate::tools::{arg_str, arg_usize, ParameterKind, Tool, ToolArgs, ToolParameter};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Look up legal definitions of a concept via `definisce` edges
pub struct DefinitionLookupTool {
    graph: Option<Arc<dyn GraphStore>>,
}

impl DefinitionLookupTool {
    pub fn new(graph: Option<Arc<dyn GraphStore>>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for DefinitionLookupTool {
    fn name(&self) -> &str {
        "definition_lookup"
    }

    fn description(&self) -> &str {
        "Find legal definitions of a concept (norms connected by 'definisce')"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("term", ParameterKind::String, "Concept to define"),
            ToolParameter::optional("top_k", ParameterKind::Integer, "Maximum definitions")
                .with_default(json!(5)),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value> {
        let Some(ref graph) = self.graph else {
            return Err(LexGraphError::Config(
                "DefinitionLookupTool requires a graph store".to_string(),
            ));
        };

        let term = arg_str(&args, "term").unwrap_or_default().to_lowercase();
        let top_k = arg_usize(&args, "top_k").unwrap_or(5);

        let cypher = "MATCH (src)-[:definisce]->(c) \
                      WHERE toLower(c.nome) CONTAINS $term \
                      RETURN src.URN AS source_urn, src.testo AS definition_text, \
                             labels(src)[0] AS source_type \
                      LIMIT $limit";
        let rows = graph
            .query(cypher, json!({"term": term, "limit": top_k}))
            .await?;

        let definitions: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                json!({
                    "source_urn": row.get("source_urn").cloned().unwrap_or(Value::Null),
                    "definition_text": row.get("definition_text").cloned().unwrap_or(Value::Null),
                    "source_type": row.get("source_type").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        Ok(json!({
            "total": definitions.len(),
            "definitions": definitions,
        }))
    }
}

/// Navigate the structural hierarchy containing a norm (libro/titolo/capo/sezione)
pub struct HierarchyNavigationTool {
    graph: Option<Arc<dyn GraphStore>>,
}

impl HierarchyNavigationTool {
    pub fn new(graph: Option<Arc<dyn GraphStore>>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for HierarchyNavigationTool {
    fn name(&self) -> &str {
        "hierarchy_navigation"
    }

    fn description(&self) -> &str {
        "Explore the structural hierarchy of a norm ('contiene' ancestors and descendants)"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("urn", ParameterKind::String, "URN of the norm"),
            ToolParameter::optional("levels", ParameterKind::Integer, "Hierarchy depth")
                .with_default(json!(3)),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value> {
        let Some(ref graph) = self.graph else {
            return Err(LexGraphError::Config(
                "HierarchyNavigationTool requires a graph store".to_string(),
            ));
        };

        let urn = arg_str(&args, "urn").unwrap_or_default();
        let levels = arg_usize(&args, "levels").unwrap_or(3).clamp(1, 5);

        let cypher = format!(
            "MATCH p = (root)-[:contiene*1..{}]->(n {{URN: $urn}}) \
             UNWIND nodes(p) AS x \
             RETURN DISTINCT x.URN AS urn, x.testo AS testo, \
                    labels(x)[0] AS tipo, x.estremi AS estremi",
            levels
        );
        let rows = graph.query(&cypher, json!({"urn": urn})).await?;

        let hierarchy: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                json!({
                    "urn": row.get("urn").cloned().unwrap_or(Value::Null),
                    "testo": row.get("testo").cloned().unwrap_or(Value::Null),
                    "tipo": row.get("tipo").cloned().unwrap_or(Value::Null),
                    "estremi": row.get("estremi").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        Ok(json!({
            "total": hierarchy.len(),
            "hierarchy": hierarchy,
        }))
    }
}
