//! Tool layer
//!
//! Tools are named, schema-described retrieval operations that experts invoke
//! by name, directly in the standard flow or picked at runtime by the ReAct
//! controller. Each tool carries a JSON-schema descriptor suitable for a
//! language-model function-calling interface.

pub mod fetch;
pub mod lookup;
pub mod registry;
pub mod search;
pub mod verify;

pub use fetch::ArticleFetchTool;
pub use lookup::{DefinitionLookupTool, HierarchyNavigationTool};
pub use registry::ToolRegistry;
pub use search::{GraphSearchTool, SemanticSearchTool};
pub use verify::VerifySourcesTool;

use crate::error::Result;
use crate::model::now_iso;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON-schema parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Descriptor for one tool parameter
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
}

impl ToolParameter {
    pub fn required(name: &str, kind: ParameterKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(name: &str, kind: ParameterKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// JSON-schema fragment for this parameter
    pub fn to_json_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let Some(ref default) = self.default {
            schema["default"] = default.clone();
        }
        if let Some(ref values) = self.enum_values {
            schema["enum"] = Value::Array(values.clone());
        }
        schema
    }
}

/// Named argument bag passed to a tool
pub type ToolArgs = Map<String, Value>;

/// Result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(data: Value, tool_name: &str) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: base_metadata(tool_name),
        }
    }

    pub fn fail(error: impl Into<String>, tool_name: &str) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            metadata: base_metadata(tool_name),
        }
    }
}

fn base_metadata(tool_name: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("timestamp".to_string(), Value::String(now_iso()));
    metadata.insert("tool_name".to_string(), Value::String(tool_name.to_string()));
    metadata
}

/// A named retrieval operation invocable by experts
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter>;

    /// Run the tool against already-validated arguments.
    ///
    /// Errors are captured by the caller into `ToolResult::fail`; handlers
    /// should return data only for the success path.
    async fn execute(&self, args: ToolArgs) -> Result<Value>;

    /// JSON schema of this tool, for function-calling interfaces
    fn schema(&self) -> Value {
        let params = self.parameters();
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &params {
            properties.insert(p.name.clone(), p.to_json_schema());
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }
}

/// Validate an argument set against a parameter list.
///
/// Returns an error message naming the offending parameter, or `None` when
/// the arguments are acceptable.
pub fn validate_args(params: &[ToolParameter], args: &ToolArgs) -> Option<String> {
    for p in params {
        if p.required && !args.contains_key(&p.name) {
            return Some(format!("Missing required parameter: {}", p.name));
        }
    }

    for key in args.keys() {
        if !params.iter().any(|p| &p.name == key) {
            return Some(format!("Unknown parameter: {}", key));
        }
    }

    None
}

/// Validate, fill defaults and execute a tool, capturing failures.
pub async fn run_tool(tool: &dyn Tool, mut args: ToolArgs) -> ToolResult {
    let params = tool.parameters();

    if let Some(error) = validate_args(&params, &args) {
        return ToolResult::fail(error, tool.name());
    }

    for p in &params {
        if let Some(ref default) = p.default {
            args.entry(p.name.clone()).or_insert_with(|| default.clone());
        }
    }

    match tool.execute(args).await {
        Ok(data) => ToolResult::ok(data, tool.name()),
        Err(e) => ToolResult::fail(e.to_string(), tool.name()),
    }
}

/// Read a string argument
pub(crate) fn arg_str<'a>(args: &'a ToolArgs, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

/// Read an integer argument
pub(crate) fn arg_usize(args: &ToolArgs, name: &str) -> Option<usize> {
    args.get(name).and_then(Value::as_u64).map(|n| n as usize)
}

/// Read a float argument
pub(crate) fn arg_f64(args: &ToolArgs, name: &str) -> Option<f64> {
    args.get(name).and_then(Value::as_f64)
}

/// Read a bool argument
pub(crate) fn arg_bool(args: &ToolArgs, name: &str) -> Option<bool> {
    args.get(name).and_then(Value::as_bool)
}

/// Read a string-array argument
pub(crate) fn arg_str_vec(args: &ToolArgs, name: &str) -> Option<Vec<String>> {
    args.get(name).and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
