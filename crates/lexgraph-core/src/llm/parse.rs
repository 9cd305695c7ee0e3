//! Helpers for parsing LLM responses into structured data

use crate::error::{LexGraphError, Result};
use serde_json::Value;

/// Strip markdown code-fence markers from a model response.
///
/// Models routinely wrap JSON answers in ```json fences even when asked not
/// to; the payload between the fences is what gets parsed.
pub fn strip_code_fences(content: &str) -> &str {
    let mut content = content.trim();

    if let Some(rest) = content.strip_prefix("```json") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix("```") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest;
    }

    content.trim()
}

/// Extract a JSON object from a response that may carry surrounding prose.
///
/// Takes the substring from the first `{` to the last `}` before parsing,
/// after fence stripping.
pub fn extract_json_object(content: &str) -> Result<Value> {
    let stripped = strip_code_fences(content);

    let candidate = match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if end > start => &stripped[start..=end],
        _ => stripped,
    };

    serde_json::from_str(candidate)
        .map_err(|e| LexGraphError::Parse(format!("invalid JSON in LLM response: {}", e)))
}
