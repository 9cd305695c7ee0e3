//! Source verification tool
//!
//! Checks that cited source ids actually exist in the graph or in the bridge
//! table. Used by the ReAct controller as a terminal grounding pass before an
//! expert cites its sources.

use crate::error::{LexGraphError, Result};
use crate::storage::{BridgeStore, GraphStore};
use crate::tools::{arg_bool, arg_str_vec, ParameterKind, Tool, ToolArgs, ToolParameter};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct VerifySourcesTool {
    graph: Option<Arc<dyn GraphStore>>,
    bridge: Option<Arc<BridgeStore>>,
}

impl VerifySourcesTool {
    pub fn new(graph: Option<Arc<dyn GraphStore>>, bridge: Option<Arc<BridgeStore>>) -> Self {
        Self { graph, bridge }
    }

    async fn urn_exists(&self, urn: &str) -> Result<bool> {
        let Some(ref graph) = self.graph else {
            return Err(LexGraphError::Config("no graph store".to_string()));
        };
        let rows = graph
            .query(
                "MATCH (n {URN: $urn}) RETURN count(n) AS cnt",
                json!({"urn": urn}),
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("cnt"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
            > 0)
    }

    fn chunk_exists(&self, id: &str) -> Result<bool> {
        let Some(ref bridge) = self.bridge else {
            return Err(LexGraphError::Config("no bridge store".to_string()));
        };
        let chunk_id: uuid::Uuid = id
            .parse()
            .map_err(|_| LexGraphError::InvalidInput(format!("not a chunk id: {}", id)))?;
        Ok(!bridge.get_nodes_for_chunk(&chunk_id)?.is_empty())
    }
}

#[async_trait]
impl Tool for VerifySourcesTool {
    fn name(&self) -> &str {
        "verify_sources"
    }

    fn description(&self) -> &str {
        "Verify that source ids exist in the knowledge graph or bridge table"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "source_ids",
                ParameterKind::Array,
                "URNs or chunk ids to verify",
            ),
            ToolParameter::optional(
                "strict_mode",
                ParameterKind::Boolean,
                "Drop ids that cannot be checked instead of passing them through",
            )
            .with_default(json!(false)),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value> {
        let source_ids = arg_str_vec(&args, "source_ids").unwrap_or_default();
        let strict_mode = arg_bool(&args, "strict_mode").unwrap_or(false);

        let mut verified = Vec::new();
        for id in &source_ids {
            let check = if id.starts_with("urn:") {
                self.urn_exists(id).await
            } else {
                self.chunk_exists(id)
            };

            match check {
                Ok(true) => verified.push(id.clone()),
                Ok(false) => {}
                // Unverifiable id: strict mode drops it, lenient mode keeps it
                Err(_) if !strict_mode => verified.push(id.clone()),
                Err(_) => {}
            }
        }

        Ok(json!({
            "total_checked": source_ids.len(),
            "verified": verified,
        }))
    }
}
