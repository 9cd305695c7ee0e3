//! Tool registry
//!
//! Holds named tools and dispatches invocations by name. Registration is
//! idempotent by tool name; the registry is populated once per expert and is
//! safe for concurrent `execute` afterwards.

use crate::tools::{run_tool, Tool, ToolArgs, ToolResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering under the same name replaces the
    /// previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name, validating arguments against its schema.
    /// Unknown tools and handler failures come back as failed results.
    pub async fn execute(&self, name: &str, args: ToolArgs) -> ToolResult {
        match self.get(name) {
            Some(tool) => run_tool(tool.as_ref(), args).await,
            None => ToolResult::fail(format!("Tool not found: {}", name), name),
        }
    }

    /// Schemas of all registered tools, for LLM function calling
    pub fn schema_of_all(&self) -> Vec<Value> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.tools[name].schema())
            .collect()
    }
}
