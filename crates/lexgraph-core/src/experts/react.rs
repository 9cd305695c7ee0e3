//! ReAct iterative exploration loop
//!
//! Thought / action / observation cycle in which the language model decides,
//! iteration by iteration, which retrieval tool to invoke next. The loop ends
//! when the model declares it has enough sources, when the novelty ratio
//! drops below the threshold, or at the iteration bound.

use crate::llm::{extract_json_object, CompletionRequest, LanguageModel};
use crate::model::{now_iso, ExpertContext};
use crate::tools::{ToolArgs, ToolRegistry, ToolResult};
use crate::trace::TraceCollector;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Bounds of the ReAct loop
#[derive(Debug, Clone)]
pub struct ReactConfig {
    pub max_iterations: usize,
    /// Stop once fewer than this fraction of returned sources is novel
    pub novelty_threshold: f64,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            novelty_threshold: 0.1,
        }
    }
}

/// Decision temperature is kept low: tool selection should be stable
const DECISION_TEMPERATURE: f32 = 0.1;

/// One thought/action/observation record
#[derive(Debug, Clone, serde::Serialize)]
pub struct ThoughtActionObservation {
    pub iteration: usize,
    pub thought: String,
    pub action: Value,
    pub observation: Value,
    pub timestamp: String,
}

/// Outcome of a completed loop
#[derive(Debug, Clone)]
pub struct ReactOutcome {
    pub sources: Vec<Value>,
    pub iterations: usize,
    pub history: Vec<ThoughtActionObservation>,
    pub converged: bool,
    pub finish_reason: String,
    pub total_tokens: u64,
}

impl ReactOutcome {
    /// Metrics document for tracing and feedback
    pub fn metrics(&self) -> Value {
        let mut tools_used: Map<String, Value> = Map::new();
        for h in &self.history {
            let tool = h
                .action
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let count = tools_used.get(&tool).and_then(Value::as_u64).unwrap_or(0);
            tools_used.insert(tool, json!(count + 1));
        }

        json!({
            "iterations": self.iterations,
            "converged": self.converged,
            "finish_reason": self.finish_reason,
            "total_sources": self.sources.len(),
            "total_tokens": self.total_tokens,
            "tools_used": tools_used,
            "history_summary": self.history.iter().map(|h| json!({
                "iteration": h.iteration,
                "tool": h.action.get("name"),
                "novel_sources": h.observation.get("novel_sources").cloned().unwrap_or(json!(0)),
            })).collect::<Vec<_>>(),
        })
    }
}

/// Parsed model decision for one iteration
struct Decision {
    action: String,
    tool: String,
    parameters: Value,
    thought: String,
    reason: String,
    tokens_used: u64,
}

/// Controller for one expert's ReAct exploration
pub struct ReactController<'a> {
    expert_type: &'a str,
    tools: &'a ToolRegistry,
    llm: Option<&'a Arc<dyn LanguageModel>>,
    model: Option<&'a str>,
    config: ReactConfig,
}

impl<'a> ReactController<'a> {
    pub fn new(
        expert_type: &'a str,
        tools: &'a ToolRegistry,
        llm: Option<&'a Arc<dyn LanguageModel>>,
        model: Option<&'a str>,
        config: ReactConfig,
    ) -> Self {
        Self {
            expert_type,
            tools,
            llm,
            model,
            config,
        }
    }

    /// Run the loop, collecting sources across iterations.
    pub async fn run(&self, context: &ExpertContext, trace: &TraceCollector) -> ReactOutcome {
        let mut sources: Vec<Value> = context.retrieved_chunks.clone();
        let mut seen: HashSet<String> = sources.iter().filter_map(source_id_of).collect();
        let mut history: Vec<ThoughtActionObservation> = Vec::new();
        let mut total_tokens: u64 = 0;
        let mut converged = false;
        let mut finish_reason = "max_iterations".to_string();

        tracing::info!(
            expert = self.expert_type,
            initial_sources = sources.len(),
            max_iterations = self.config.max_iterations,
            "ReAct loop started"
        );

        for iteration in 0..self.config.max_iterations {
            let decision = self.decide(context, &sources, &history, trace).await;
            total_tokens += decision.tokens_used;

            if decision.action == "finish" {
                tracing::info!(
                    expert = self.expert_type,
                    iteration = iteration + 1,
                    "ReAct loop finished by model decision"
                );
                history.push(ThoughtActionObservation {
                    iteration: iteration + 1,
                    thought: decision.thought,
                    action: json!({"name": "finish", "reason": decision.reason}),
                    observation: json!({"status": "finished", "total_sources": sources.len()}),
                    timestamp: now_iso(),
                });
                converged = true;
                finish_reason = "finish".to_string();
                break;
            }

            let args: ToolArgs = decision
                .parameters
                .as_object()
                .cloned()
                .unwrap_or_default();

            let start = Instant::now();
            let result = self.tools.execute(&decision.tool, args).await;
            let latency_ms = start.elapsed().as_millis() as f64;

            let extracted = extract_sources_from_result(&result);
            let mut novel = 0usize;
            for source in &extracted {
                if let Some(id) = source_id_of(source) {
                    if seen.insert(id) {
                        sources.push(source.clone());
                        novel += 1;
                    }
                }
            }

            trace.add_tool_call(
                self.expert_type,
                &decision.tool,
                decision.parameters.clone(),
                extracted.len(),
                latency_ms,
            );
            if !extracted.is_empty() {
                trace.add_retrieval(
                    self.expert_type,
                    &format!("react:{}", decision.tool),
                    extracted.clone(),
                    latency_ms,
                );
            }

            history.push(ThoughtActionObservation {
                iteration: iteration + 1,
                thought: decision.thought,
                action: json!({
                    "name": decision.tool,
                    "parameters": decision.parameters,
                    "success": result.success,
                }),
                observation: json!({
                    "results_found": extracted.len(),
                    "novel_sources": novel,
                    "total_sources": sources.len(),
                }),
                timestamp: now_iso(),
            });

            tracing::debug!(
                expert = self.expert_type,
                iteration = iteration + 1,
                found = extracted.len(),
                novel,
                total = sources.len(),
                "ReAct iteration completed"
            );

            let novelty_ratio = if extracted.is_empty() {
                0.0
            } else {
                novel as f64 / extracted.len() as f64
            };

            if iteration > 0 && novelty_ratio < self.config.novelty_threshold {
                tracing::info!(
                    expert = self.expert_type,
                    iteration = iteration + 1,
                    novelty_ratio,
                    threshold = self.config.novelty_threshold,
                    "ReAct loop converged"
                );
                converged = true;
                finish_reason = "converged".to_string();
                break;
            }
        }

        tracing::info!(
            expert = self.expert_type,
            iterations = history.len(),
            total_sources = sources.len(),
            converged,
            "ReAct loop completed"
        );

        ReactOutcome {
            iterations: history.len(),
            sources,
            history,
            converged,
            finish_reason,
            total_tokens,
        }
    }

    /// Run the loop, then keep only sources that pass strict verification.
    pub async fn run_with_verification(
        &self,
        context: &ExpertContext,
        trace: &TraceCollector,
    ) -> ReactOutcome {
        let mut outcome = self.run(context, trace).await;

        let source_ids: Vec<Value> = outcome
            .sources
            .iter()
            .filter_map(source_id_of)
            .map(Value::String)
            .collect();
        if source_ids.is_empty() || self.tools.get("verify_sources").is_none() {
            return outcome;
        }

        let mut args = ToolArgs::new();
        args.insert("source_ids".to_string(), Value::Array(source_ids));
        args.insert("strict_mode".to_string(), json!(true));

        let result = self.tools.execute("verify_sources", args).await;
        if !result.success {
            tracing::warn!(
                expert = self.expert_type,
                error = result.error.as_deref().unwrap_or(""),
                "source verification failed, keeping unverified sources"
            );
            return outcome;
        }

        let verified: HashSet<String> = result.data["verified"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let before = outcome.sources.len();
        outcome
            .sources
            .retain(|s| source_id_of(s).map(|id| verified.contains(&id)).unwrap_or(false));

        tracing::info!(
            expert = self.expert_type,
            original = before,
            verified = outcome.sources.len(),
            "source verification completed"
        );

        outcome
    }

    async fn decide(
        &self,
        context: &ExpertContext,
        sources: &[Value],
        history: &[ThoughtActionObservation],
        trace: &TraceCollector,
    ) -> Decision {
        let Some(llm) = self.llm else {
            return finish_decision("no language model configured");
        };

        let prompt = self.build_decision_prompt(context, sources, history);
        let request = CompletionRequest::new(prompt.clone())
            .with_temperature(DECISION_TEMPERATURE)
            .expect_json();
        let request = match self.model {
            Some(model) => request.with_model(model),
            None => request,
        };

        let start = Instant::now();
        match llm.generate(request).await {
            Ok(response) => {
                trace.add_llm_call(
                    self.expert_type,
                    &prompt,
                    &response.content,
                    response.total_tokens,
                    start.elapsed().as_millis() as f64,
                );
                match extract_json_object(&response.content) {
                    Ok(value) => Decision {
                        action: value["action"].as_str().unwrap_or("finish").to_string(),
                        tool: value["tool"].as_str().unwrap_or("").to_string(),
                        parameters: value.get("parameters").cloned().unwrap_or(json!({})),
                        thought: value["thought"].as_str().unwrap_or("").to_string(),
                        reason: value["reason"].as_str().unwrap_or("").to_string(),
                        tokens_used: response.total_tokens,
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "ReAct decision parse failed");
                        finish_decision(&format!("decision parse error: {}", e))
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "ReAct decision call failed");
                finish_decision(&format!("decision error: {}", e))
            }
        }
    }

    fn build_decision_prompt(
        &self,
        context: &ExpertContext,
        sources: &[Value],
        history: &[ThoughtActionObservation],
    ) -> String {
        let schemas = self.tools.schema_of_all();
        let mut prompt = format!(
            "Sei un expert {} per l'interpretazione giuridica italiana.\n\
             Il tuo compito è decidere quale strumento usare per raccogliere informazioni.\n\n\
             ## QUERY UTENTE\n{}\n\n\
             ## TOOLS DISPONIBILI\n{}\n\n\
             ## FONTI GIÀ RECUPERATE: {}\n",
            self.expert_type,
            context.query_text,
            serde_json::to_string_pretty(&schemas).unwrap_or_default(),
            sources.len(),
        );

        if !sources.is_empty() {
            prompt.push_str("\nFonti già raccolte:\n");
            for (i, source) in sources.iter().take(5).enumerate() {
                let id = source_id_of(source).unwrap_or_default();
                let text = source.get("text").and_then(Value::as_str).unwrap_or("");
                let preview: String = text.chars().take(100).collect();
                prompt.push_str(&format!("  {}. [{}] {}...\n", i + 1, id, preview));
            }
            if sources.len() > 5 {
                prompt.push_str(&format!("  ... e altre {} fonti\n", sources.len() - 5));
            }
        }

        if !history.is_empty() {
            prompt.push_str("\n## AZIONI PRECEDENTI\n");
            for h in history.iter().rev().take(3).rev() {
                let name = h.action.get("name").and_then(Value::as_str).unwrap_or("unknown");
                let novel = h
                    .observation
                    .get("novel_sources")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                prompt.push_str(&format!(
                    "- Iterazione {}: {} → {} nuove fonti\n",
                    h.iteration, name, novel
                ));
            }
        }

        prompt.push_str(
            "\n## ISTRUZIONI\n\
             1. Se hai ABBASTANZA fonti per rispondere (almeno 3-5 rilevanti):\n\
                {\"action\": \"finish\", \"thought\": \"...\", \"reason\": \"...\"}\n\
             2. Se ti servono PIÙ fonti:\n\
                {\"action\": \"tool\", \"tool\": \"nome_tool\", \"parameters\": {...}, \"thought\": \"...\"}\n\n\
             Rispondi SOLO con JSON valido, senza commenti o testo aggiuntivo.\n",
        );

        prompt
    }
}

fn finish_decision(reason: &str) -> Decision {
    Decision {
        action: "finish".to_string(),
        tool: String::new(),
        parameters: json!({}),
        thought: "Unable to decide next action".to_string(),
        reason: reason.to_string(),
        tokens_used: 0,
    }
}

/// Identifier used for deduplication: urn first, chunk_id as fallback
pub fn source_id_of(source: &Value) -> Option<String> {
    for key in ["urn", "chunk_id"] {
        if let Some(id) = source.get(key).and_then(Value::as_str) {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Extract usable sources from a tool result, by tool result shape.
pub fn extract_sources_from_result(result: &ToolResult) -> Vec<Value> {
    if !result.success {
        return Vec::new();
    }
    let data = &result.data;

    let sources: Vec<Value> = if let Some(results) = data.get("results").and_then(Value::as_array) {
        results.clone()
    } else if let Some(nodes) = data.get("nodes").and_then(Value::as_array) {
        nodes
            .iter()
            .map(|node| {
                let props = node.get("properties").cloned().unwrap_or(json!({}));
                let text = props
                    .get("testo_vigente")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .or_else(|| props.get("testo").and_then(Value::as_str))
                    .unwrap_or("");
                json!({
                    "urn": node.get("urn").cloned().unwrap_or(json!("")),
                    "text": text,
                    "type": node.get("type").cloned().unwrap_or(json!("")),
                    "source": "graph_search",
                })
            })
            .collect()
    } else if let Some(definitions) = data.get("definitions").and_then(Value::as_array) {
        definitions
            .iter()
            .map(|d| {
                json!({
                    "urn": d.get("source_urn").cloned().unwrap_or(json!("")),
                    "text": d.get("definition_text").cloned().unwrap_or(json!("")),
                    "type": d.get("source_type").cloned().unwrap_or(json!("")),
                    "source": "definition_lookup",
                })
            })
            .collect()
    } else if let Some(hierarchy) = data.get("hierarchy").and_then(Value::as_array) {
        hierarchy
            .iter()
            .map(|n| {
                json!({
                    "urn": n.get("urn").cloned().unwrap_or(json!("")),
                    "text": n.get("testo").cloned().unwrap_or(json!("")),
                    "type": n.get("tipo").cloned().unwrap_or(json!("")),
                    "estremi": n.get("estremi").cloned().unwrap_or(json!("")),
                    "source": "hierarchy_navigation",
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    sources
        .into_iter()
        .filter(|s| {
            let has_text = s
                .get("text")
                .and_then(Value::as_str)
                .map(|t| !t.is_empty())
                .unwrap_or(false);
            let has_urn = s
                .get("urn")
                .and_then(Value::as_str)
                .map(|u| !u.is_empty())
                .unwrap_or(false);
            has_text || has_urn
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(data: Value) -> ToolResult {
        ToolResult::ok(data, "test")
    }

    #[test]
    fn extracts_semantic_results() {
        let result = ok_result(json!({
            "results": [
                {"chunk_id": "c1", "text": "Art. 1453", "final_score": 0.8},
                {"chunk_id": "c2", "text": "", "final_score": 0.3},
            ]
        }));
        let sources = extract_sources_from_result(&result);
        // second entry survives: it has a chunk id but extraction filters on
        // text/urn only, and chunk_id alone is not enough
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0]["chunk_id"], "c1");
    }

    #[test]
    fn extracts_graph_nodes_preferring_testo_vigente() {
        let result = ok_result(json!({
            "nodes": [
                {"urn": "urn:a", "type": "Norma",
                 "properties": {"testo": "vecchio", "testo_vigente": "vigente"}},
                {"urn": "urn:b", "type": "Norma", "properties": {"testo": "testo base"}},
                {"urn": "", "type": "Norma", "properties": {}},
            ]
        }));
        let sources = extract_sources_from_result(&result);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0]["text"], "vigente");
        assert_eq!(sources[1]["text"], "testo base");
        assert_eq!(sources[0]["source"], "graph_search");
    }

    #[test]
    fn extracts_definitions_and_hierarchy() {
        let defs = extract_sources_from_result(&ok_result(json!({
            "definitions": [{"source_urn": "urn:d", "definition_text": "def", "source_type": "Norma"}]
        })));
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["source"], "definition_lookup");

        let hier = extract_sources_from_result(&ok_result(json!({
            "hierarchy": [{"urn": "urn:h", "testo": "t", "tipo": "Capo", "estremi": "Capo I"}]
        })));
        assert_eq!(hier.len(), 1);
        assert_eq!(hier[0]["source"], "hierarchy_navigation");
    }

    #[test]
    fn failed_result_extracts_nothing() {
        let result = ToolResult::fail("boom", "test");
        assert!(extract_sources_from_result(&result).is_empty());
    }

    #[test]
    fn source_id_prefers_urn() {
        let s = json!({"urn": "urn:a", "chunk_id": "c1"});
        assert_eq!(source_id_of(&s), Some("urn:a".to_string()));
        let s = json!({"chunk_id": "c1"});
        assert_eq!(source_id_of(&s), Some("c1".to_string()));
        let s = json!({"text": "no id"});
        assert_eq!(source_id_of(&s), None);
    }

    #[tokio::test]
    async fn without_llm_finishes_immediately() {
        let tools = ToolRegistry::new();
        let controller =
            ReactController::new("systemic", &tools, None, None, ReactConfig::default());
        let context = ExpertContext::new("query");
        let trace = TraceCollector::new("t", "query");

        let outcome = controller.run(&context, &trace).await;
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.converged);
        assert_eq!(outcome.finish_reason, "finish");
        assert!(outcome.sources.is_empty());
    }

    #[test]
    fn metrics_counts_tools() {
        let outcome = ReactOutcome {
            sources: vec![json!({"urn": "urn:a"})],
            iterations: 2,
            history: vec![
                ThoughtActionObservation {
                    iteration: 1,
                    thought: String::new(),
                    action: json!({"name": "semantic_search"}),
                    observation: json!({"novel_sources": 3}),
                    timestamp: now_iso(),
                },
                ThoughtActionObservation {
                    iteration: 2,
                    thought: String::new(),
                    action: json!({"name": "semantic_search"}),
                    observation: json!({"novel_sources": 0}),
                    timestamp: now_iso(),
                },
            ],
            converged: true,
            finish_reason: "converged".to_string(),
            total_tokens: 42,
        };

        let metrics = outcome.metrics();
        assert_eq!(metrics["iterations"], 2);
        assert_eq!(metrics["converged"], true);
        assert_eq!(metrics["tools_used"]["semantic_search"], 2);
        assert_eq!(metrics["history_summary"][1]["novel_sources"], 0);
    }
}
