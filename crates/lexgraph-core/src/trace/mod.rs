//! Per-query trace collection
//!
//! Append-only log of everything a query invocation did: retrieval steps,
//! LLM calls, tool calls, routing, expert results, aggregation and the
//! optional baseline. One collector per query, shared across the expert tasks
//! of that query and never across queries. Sealed into a `TraceDocument` when
//! the response is emitted.

use crate::model::{now_iso, LegalSource};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded retrieval step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalStep {
    pub expert: String,
    pub query: String,
    pub results: Vec<Value>,
    pub latency_ms: f64,
    pub timestamp: String,
}

/// One recorded language-model call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub expert: String,
    pub prompt: String,
    pub response: String,
    pub tokens: u64,
    pub latency_ms: f64,
    pub timestamp: String,
}

/// One recorded tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub expert: String,
    pub tool: String,
    pub params: Value,
    pub result_count: usize,
    pub latency_ms: f64,
    pub timestamp: String,
}

/// Baseline (no-retrieval) comparison record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub response: String,
    pub latency_ms: f64,
    pub sources_cited: Vec<String>,
    pub timestamp: String,
}

/// Snapshot of the engine configuration at query time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub hash: String,
    pub configs: Value,
}

impl ConfigSnapshot {
    /// Snapshot a serializable config, keyed by its SHA-256
    pub fn capture<T: Serialize>(config: &T) -> Self {
        let configs = serde_json::to_value(config).unwrap_or(Value::Null);
        let serialized = configs.to_string();
        let hash = format!("{:x}", Sha256::digest(serialized.as_bytes()));
        Self { hash, configs }
    }
}

#[derive(Debug, Default)]
struct TraceState {
    retrieval_steps: Vec<RetrievalStep>,
    llm_calls: Vec<LlmCallRecord>,
    tool_calls: Vec<ToolCallRecord>,
    routing: Value,
    expert_results: HashMap<String, Value>,
    aggregation: Value,
    baseline: Option<BaselineRecord>,
    config_snapshot: Option<ConfigSnapshot>,
}

/// Single-writer trace sink for one query invocation
pub struct TraceCollector {
    trace_id: String,
    query: String,
    started_at: chrono::DateTime<Utc>,
    state: Mutex<TraceState>,
}

impl TraceCollector {
    pub fn new(trace_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            query: query.into(),
            started_at: Utc::now(),
            state: Mutex::new(TraceState::default()),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn add_retrieval(&self, expert: &str, query: &str, results: Vec<Value>, latency_ms: f64) {
        let mut state = self.state.lock().expect("trace lock poisoned");
        state.retrieval_steps.push(RetrievalStep {
            expert: expert.to_string(),
            query: query.to_string(),
            results,
            latency_ms,
            timestamp: now_iso(),
        });
    }

    pub fn add_llm_call(
        &self,
        expert: &str,
        prompt: &str,
        response: &str,
        tokens: u64,
        latency_ms: f64,
    ) {
        let mut state = self.state.lock().expect("trace lock poisoned");
        state.llm_calls.push(LlmCallRecord {
            expert: expert.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            tokens,
            latency_ms,
            timestamp: now_iso(),
        });
    }

    pub fn add_tool_call(
        &self,
        expert: &str,
        tool: &str,
        params: Value,
        result_count: usize,
        latency_ms: f64,
    ) {
        let mut state = self.state.lock().expect("trace lock poisoned");
        state.tool_calls.push(ToolCallRecord {
            expert: expert.to_string(),
            tool: tool.to_string(),
            params,
            result_count,
            latency_ms,
            timestamp: now_iso(),
        });
    }

    pub fn set_routing(&self, routing: Value) {
        self.state.lock().expect("trace lock poisoned").routing = routing;
    }

    pub fn add_expert_result(&self, expert: &str, result: Value) {
        self.state
            .lock()
            .expect("trace lock poisoned")
            .expert_results
            .insert(expert.to_string(), result);
    }

    pub fn set_aggregation(&self, aggregation: Value) {
        self.state.lock().expect("trace lock poisoned").aggregation = aggregation;
    }

    pub fn set_baseline(&self, response: &str, latency_ms: f64, sources_cited: Vec<String>) {
        self.state.lock().expect("trace lock poisoned").baseline = Some(BaselineRecord {
            response: response.to_string(),
            latency_ms,
            sources_cited,
            timestamp: now_iso(),
        });
    }

    pub fn set_config_snapshot(&self, snapshot: ConfigSnapshot) {
        self.state.lock().expect("trace lock poisoned").config_snapshot = Some(snapshot);
    }

    /// Ids of everything retrieval returned for this query, the ground truth
    /// against which citations are validated.
    pub fn retrieved_ids(&self) -> Vec<String> {
        let state = self.state.lock().expect("trace lock poisoned");
        let mut ids = Vec::new();
        for step in &state.retrieval_steps {
            for result in &step.results {
                for key in ["chunk_id", "source_id", "urn"] {
                    if let Some(id) = result.get(key).and_then(Value::as_str) {
                        if !id.is_empty() {
                            ids.push(id.to_string());
                        }
                    }
                }
            }
        }
        ids
    }

    /// Seal the trace into its final document
    pub fn finish(&self, cited_sources: &[LegalSource]) -> TraceDocument {
        let validation = validate_sources(cited_sources, &self.retrieved_ids());
        let state = self.state.lock().expect("trace lock poisoned");
        let total_latency_ms = (Utc::now() - self.started_at).num_milliseconds() as f64;

        TraceDocument {
            trace_id: self.trace_id.clone(),
            query: self.query.clone(),
            timestamp: self.started_at.to_rfc3339(),
            total_latency_ms,
            routing: state.routing.clone(),
            retrieval_steps: state.retrieval_steps.clone(),
            llm_calls: state.llm_calls.clone(),
            tool_calls: state.tool_calls.clone(),
            expert_results: state.expert_results.clone(),
            aggregation: state.aggregation.clone(),
            baseline: state.baseline.clone(),
            source_validation: validation,
            config_snapshot: state.config_snapshot.clone(),
        }
    }
}

/// Sealed trace of one query invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDocument {
    pub trace_id: String,
    pub query: String,
    pub timestamp: String,
    pub total_latency_ms: f64,
    pub routing: Value,
    pub retrieval_steps: Vec<RetrievalStep>,
    pub llm_calls: Vec<LlmCallRecord>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub expert_results: HashMap<String, Value>,
    pub aggregation: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineRecord>,
    pub source_validation: SourceValidation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_snapshot: Option<ConfigSnapshot>,
}

/// Outcome of checking cited sources against the retrieval trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceValidation {
    pub validated: Vec<Value>,
    pub hallucinated: Vec<Value>,
    pub validated_count: usize,
    pub hallucinated_count: usize,
    pub grounding_rate: f64,
}

/// Split cited sources into grounded and hallucinated against the set of
/// retrieved ids. Grounding rate is the grounded fraction.
pub fn validate_sources(cited: &[LegalSource], retrieved_ids: &[String]) -> SourceValidation {
    let retrieved: std::collections::HashSet<&str> =
        retrieved_ids.iter().map(String::as_str).collect();

    let mut validated = Vec::new();
    let mut hallucinated = Vec::new();

    for source in cited {
        let entry = json!({
            "source_id": source.source_id,
            "citation": source.citation,
            "source_type": source.source_type,
        });
        if retrieved.contains(source.source_id.as_str()) {
            validated.push(entry);
        } else {
            hallucinated.push(entry);
        }
    }

    let total = cited.len();
    let grounding_rate = if total > 0 {
        validated.len() as f64 / total as f64
    } else {
        0.0
    };

    SourceValidation {
        validated_count: validated.len(),
        hallucinated_count: hallucinated.len(),
        validated,
        hallucinated,
        grounding_rate,
    }
}

lazy_static! {
    static ref CITATION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)art\.?\s*\d+(?:\s*(?:bis|ter|quater|quinquies|sexies))?\s*c\.?c\.?")
            .expect("citation pattern"),
        Regex::new(r"(?i)art\.?\s*\d+(?:\s*(?:bis|ter|quater|quinquies|sexies))?\s*c\.?p\.?")
            .expect("citation pattern"),
        Regex::new(r"(?i)legge\s*\d+/\d+").expect("citation pattern"),
    ];
}

/// Extract article citations from free text (e.g. "art. 1453 c.c.").
/// Used for the no-retrieval baseline comparison.
pub fn extract_article_citations(text: &str) -> Vec<String> {
    let mut citations: Vec<String> = CITATION_PATTERNS
        .iter()
        .flat_map(|p| p.find_iter(text).map(|m| m.as_str().to_string()))
        .collect();
    citations.sort();
    citations.dedup();
    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> LegalSource {
        LegalSource {
            source_type: "norm".to_string(),
            source_id: id.to_string(),
            citation: format!("cit-{}", id),
            excerpt: String::new(),
            relevance: String::new(),
        }
    }

    #[test]
    fn grounding_rate_splits_sources() {
        let retrieved = vec!["urn:a".to_string(), "urn:b".to_string()];
        let cited = vec![source("urn:a"), source("urn:c")];

        let validation = validate_sources(&cited, &retrieved);
        assert_eq!(validation.validated_count, 1);
        assert_eq!(validation.hallucinated_count, 1);
        assert!((validation.grounding_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_citations_have_zero_rate() {
        let validation = validate_sources(&[], &["urn:a".to_string()]);
        assert_eq!(validation.validated_count, 0);
        assert!((validation.grounding_rate - 0.0).abs() < 1e-9);
    }

    #[test]
    fn citation_extraction() {
        let text =
            "Si applica l'art. 1453 c.c. in combinato con l'Art. 52 c.p.; vedi anche legge 241/1990.";
        let citations = extract_article_citations(text);
        assert!(citations.iter().any(|c| c.contains("1453")));
        assert!(citations.iter().any(|c| c.contains("52")));
        assert!(citations.iter().any(|c| c.contains("241/1990")));
    }

    #[test]
    fn collector_round_trip() {
        let collector = TraceCollector::new("t1", "query di prova");
        collector.add_retrieval(
            "literal",
            "query di prova",
            vec![json!({"chunk_id": "c1", "source_id": "urn:a"})],
            12.0,
        );
        collector.add_tool_call("literal", "semantic_search", json!({"top_k": 5}), 1, 12.0);
        collector.add_llm_call("literal", "prompt", "risposta", 120, 300.0);
        collector.set_routing(json!({"query_type": "definitional"}));
        collector.add_expert_result("literal", json!({"confidence": 0.8}));

        let doc = collector.finish(&[source("urn:a"), source("urn:z")]);
        assert_eq!(doc.trace_id, "t1");
        assert_eq!(doc.retrieval_steps.len(), 1);
        assert_eq!(doc.tool_calls.len(), 1);
        assert_eq!(doc.llm_calls.len(), 1);
        assert_eq!(doc.source_validation.validated_count, 1);
        assert_eq!(doc.source_validation.hallucinated_count, 1);
        assert!(doc.expert_results.contains_key("literal"));
    }

    #[test]
    fn config_snapshot_hash_is_stable() {
        let a = ConfigSnapshot::capture(&json!({"alpha": 0.7}));
        let b = ConfigSnapshot::capture(&json!({"alpha": 0.7}));
        let c = ConfigSnapshot::capture(&json!({"alpha": 0.8}));
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }
}
