//! Expert analysis flows
//!
//! Standard mode runs a fixed sequence (semantic search, then graph
//! expansion of the referenced norms), ReAct mode hands source collection to
//! the controller. Both end with one language-model synthesis call parsed
//! into a structured response, degrading gracefully when the model is absent
//! or keeps answering malformed JSON.

use crate::experts::react::{extract_sources_from_result, source_id_of, ReactController};
use crate::experts::Expert;
use crate::llm::{extract_json_object, CompletionRequest};
use crate::model::{
    ConfidenceFactors, ExpertContext, ExpertResponse, LegalSource, ReasoningStep,
};
use crate::trace::TraceCollector;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Attempts for the structured-response call before degrading
const MAX_PARSE_RETRIES: u32 = 3;

/// Marker included in limitations of every degraded no-LLM response
pub const NO_LLM_FALLBACK_MARKER: &str = "senza servizio LLM";

/// URNs expanded per query in the standard flow
const MAX_URNS_TO_EXPAND: usize = 5;

impl Expert {
    /// Analyze the query with this expert's interpretive canon.
    ///
    /// Never fails: every error path produces a degraded response with the
    /// failure recorded in `limitations`.
    pub async fn analyze(
        &self,
        context: &ExpertContext,
        trace: &TraceCollector,
    ) -> ExpertResponse {
        let start = Instant::now();
        let kind = self.kind().as_str();

        tracing::info!(expert = kind, trace_id = %context.trace_id, "expert analyzing");

        let include_search = context
            .metadata
            .get("include_search")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let (sources, react_metrics, react_tokens) = if !include_search {
            (context.retrieved_chunks.clone(), None, 0)
        } else if self.uses_react() {
            let controller = ReactController::new(
                kind,
                self.tools(),
                self.llm(),
                self.model(),
                self.react_config().clone(),
            );
            let outcome = controller.run_with_verification(context, trace).await;
            let metrics = outcome.metrics();
            let tokens = outcome.total_tokens;
            (outcome.sources, Some(metrics), tokens)
        } else {
            (self.collect_sources_standard(context, trace).await, None, 0)
        };

        let mut response = match self.llm() {
            Some(_) => self.analyze_with_llm(context, &sources, trace).await,
            None => self.fallback_without_llm(context, &sources),
        };

        response.tokens_used += react_tokens;
        response.execution_time_ms = start.elapsed().as_millis() as f64;
        if let Some(metrics) = react_metrics {
            response.metadata.insert("react_metrics".to_string(), metrics);
        }

        tracing::info!(
            expert = kind,
            confidence = response.confidence,
            sources = response.legal_basis.len(),
            time_ms = response.execution_time_ms,
            "expert completed"
        );

        response
    }

    /// Fixed-sequence source collection: semantic search filtered by the
    /// canon's source types, then graph expansion of referenced norms.
    async fn collect_sources_standard(
        &self,
        context: &ExpertContext,
        trace: &TraceCollector,
    ) -> Vec<Value> {
        let kind = self.kind().as_str();
        let mut sources: Vec<Value> = context.retrieved_chunks.clone();
        let mut seen: HashSet<String> = sources.iter().filter_map(source_id_of).collect();

        let source_types: Vec<Value> = self
            .profile()
            .source_types
            .iter()
            .map(|t| json!(t.as_str()))
            .collect();

        let mut urns_to_expand: Vec<String> = context.norm_references().to_vec();

        if self.tools().get("semantic_search").is_some() {
            let mut args = crate::tools::ToolArgs::new();
            args.insert("query".to_string(), json!(context.query_text));
            args.insert("top_k".to_string(), json!(self.top_k()));
            args.insert("source_types".to_string(), Value::Array(source_types));
            args.insert("expert_type".to_string(), json!(kind));

            let start = Instant::now();
            let result = self
                .tools()
                .execute("semantic_search", args.clone())
                .await;
            let latency_ms = start.elapsed().as_millis() as f64;

            let extracted = extract_sources_from_result(&result);
            trace.add_tool_call(
                kind,
                "semantic_search",
                Value::Object(args),
                extracted.len(),
                latency_ms,
            );
            if !extracted.is_empty() {
                trace.add_retrieval(kind, &context.query_text, extracted.clone(), latency_ms);
            }

            for source in extracted {
                if let Some(urn) = source
                    .get("metadata")
                    .and_then(|m| m.get("article_urn"))
                    .and_then(Value::as_str)
                {
                    if !urn.is_empty() {
                        urns_to_expand.push(urn.to_string());
                    }
                }
                if let Some(id) = source_id_of(&source) {
                    if seen.insert(id) {
                        sources.push(source);
                    }
                }
            }
        }

        if self.tools().get("graph_search").is_some() {
            let mut expanded: HashSet<String> = HashSet::new();
            let relation_types: Vec<Value> = self
                .traversal_weights()
                .priority_relations()
                .into_iter()
                .map(Value::String)
                .collect();

            for urn in urns_to_expand {
                if !expanded.insert(urn.clone()) {
                    continue;
                }
                if expanded.len() > MAX_URNS_TO_EXPAND {
                    break;
                }

                let mut args = crate::tools::ToolArgs::new();
                args.insert("start_node".to_string(), json!(urn));
                args.insert(
                    "relation_types".to_string(),
                    Value::Array(relation_types.clone()),
                );
                args.insert("max_hops".to_string(), json!(2));
                args.insert("direction".to_string(), json!(self.profile().direction));

                let start = Instant::now();
                let result = self.tools().execute("graph_search", args.clone()).await;
                let latency_ms = start.elapsed().as_millis() as f64;

                let extracted = extract_sources_from_result(&result);
                trace.add_tool_call(
                    kind,
                    "graph_search",
                    Value::Object(args),
                    extracted.len(),
                    latency_ms,
                );
                if !extracted.is_empty() {
                    trace.add_retrieval(
                        kind,
                        &format!("graph:{}", urn),
                        extracted.clone(),
                        latency_ms,
                    );
                }

                for source in extracted {
                    if let Some(id) = source_id_of(&source) {
                        if seen.insert(id) {
                            sources.push(source);
                        }
                    }
                }
            }
        }

        sources
    }

    /// Synthesis call with parse retries and degradation
    async fn analyze_with_llm(
        &self,
        context: &ExpertContext,
        sources: &[Value],
        trace: &TraceCollector,
    ) -> ExpertResponse {
        let kind = self.kind().as_str();
        let llm = self.llm().expect("checked by caller");

        let prompt = format!(
            "{}\n\n{}",
            self.prompt_template(),
            format_context_for_llm(context, sources)
        );

        let mut last_content = String::new();
        let mut total_tokens: u64 = 0;

        for attempt in 0..MAX_PARSE_RETRIES {
            let request = CompletionRequest::new(prompt.clone())
                .with_temperature(self.temperature())
                .expect_json();
            let request = match self.model() {
                Some(model) => request.with_model(model),
                None => request,
            };

            let start = Instant::now();
            let response = match llm.generate(request).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(expert = kind, error = %e, "LLM call failed");
                    return ExpertResponse::degraded(
                        kind,
                        format!("Errore durante l'analisi: {}", e),
                        e.to_string(),
                        &context.trace_id,
                    );
                }
            };

            trace.add_llm_call(
                kind,
                &prompt,
                &response.content,
                response.total_tokens,
                start.elapsed().as_millis() as f64,
            );
            total_tokens += response.total_tokens;
            last_content = response.content.clone();

            match extract_json_object(&response.content) {
                Ok(data) => {
                    let mut parsed = build_response(kind, &data, &context.trace_id);
                    parsed.tokens_used = total_tokens;
                    return parsed;
                }
                Err(e) => {
                    tracing::warn!(
                        expert = kind,
                        attempt = attempt + 1,
                        error = %e,
                        "structured response parse failed"
                    );
                    if attempt + 1 < MAX_PARSE_RETRIES {
                        let backoff = 0.5 * 2f64.powi(attempt as i32);
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    }
                }
            }
        }

        // Parse kept failing: degrade to the raw output, truncated
        let truncated: String = last_content.chars().take(1000).collect();
        ExpertResponse {
            expert_type: kind.to_string(),
            interpretation: truncated,
            confidence: 0.3,
            limitations: "failed to parse structured response".to_string(),
            trace_id: context.trace_id.clone(),
            tokens_used: total_tokens,
            ..ExpertResponse::degraded(kind, "", "", &context.trace_id)
        }
    }

    /// Degraded response when no language model is configured: plain listing
    /// of the top retrieved sources, low confidence.
    fn fallback_without_llm(&self, context: &ExpertContext, sources: &[Value]) -> ExpertResponse {
        let kind = self.kind().as_str();
        let top: Vec<&Value> = sources.iter().take(5).collect();

        let legal_basis: Vec<LegalSource> = top
            .iter()
            .map(|chunk| {
                let id = source_id_of(chunk).unwrap_or_default();
                let text = chunk.get("text").and_then(Value::as_str).unwrap_or("");
                LegalSource {
                    source_type: "norm".to_string(),
                    source_id: id.clone(),
                    citation: id,
                    excerpt: text.chars().take(500).collect(),
                    relevance: "Recuperato per similarità semantica".to_string(),
                }
            })
            .collect();

        let mut interpretation = String::from("Fonti recuperate per la query:\n\n");
        for (i, chunk) in top.iter().enumerate() {
            let text = chunk.get("text").and_then(Value::as_str).unwrap_or("");
            let preview: String = text.chars().take(200).collect();
            interpretation.push_str(&format!("{}. {}...\n\n", i + 1, preview));
        }
        interpretation.push_str("[Nota: interpretazione completa richiede un servizio LLM]");

        ExpertResponse {
            expert_type: kind.to_string(),
            interpretation,
            legal_basis,
            reasoning_steps: Vec::new(),
            confidence: 0.3,
            confidence_factors: ConfidenceFactors::default(),
            limitations: format!("Analisi degradata {}: solo recupero fonti", NO_LLM_FALLBACK_MARKER),
            trace_id: context.trace_id.clone(),
            execution_time_ms: 0.0,
            tokens_used: 0,
            timestamp: crate::model::now_iso(),
            metadata: Default::default(),
        }
    }

    fn prompt_template(&self) -> &str {
        &self.prompt_template
    }
}

/// Render the enriched context as the LLM user prompt
fn format_context_for_llm(context: &ExpertContext, sources: &[Value]) -> String {
    let mut sections = vec![format!("## DOMANDA DELL'UTENTE\n{}", context.query_text)];

    if !context.norm_references().is_empty() {
        sections.push(format!(
            "\n## NORME CITATE NELLA DOMANDA\n{}",
            context.norm_references().join(", ")
        ));
    }
    if !context.legal_concepts().is_empty() {
        sections.push(format!(
            "\n## CONCETTI GIURIDICI IDENTIFICATI\n{}",
            context.legal_concepts().join(", ")
        ));
    }

    if !sources.is_empty() {
        sections.push("\n## FONTI RECUPERATE".to_string());
        for (i, chunk) in sources.iter().take(5).enumerate() {
            let text = chunk.get("text").and_then(Value::as_str).unwrap_or("");
            let id = source_id_of(chunk).unwrap_or_else(|| "N/A".to_string());
            let score = chunk
                .get("final_score")
                .or_else(|| chunk.get("similarity_score"))
                .and_then(Value::as_f64)
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "N/A".to_string());
            sections.push(format!(
                "\n### Fonte {} (URN: {}, score: {})\n{}",
                i + 1,
                id,
                score,
                text
            ));
        }
    }

    sections.join("\n")
}

/// Build a structured response from the model's JSON object
fn build_response(expert_type: &str, data: &Value, trace_id: &str) -> ExpertResponse {
    let legal_basis: Vec<LegalSource> = data
        .get("legal_basis")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|lb| LegalSource {
                    source_type: lb
                        .get("source_type")
                        .and_then(Value::as_str)
                        .unwrap_or("norm")
                        .to_string(),
                    source_id: lb
                        .get("source_id")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    citation: lb
                        .get("citation")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    excerpt: lb
                        .get("excerpt")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    relevance: lb
                        .get("relevance")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let reasoning_steps: Vec<ReasoningStep> = data
        .get("reasoning_steps")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|rs| ReasoningStep {
                    step_number: rs
                        .get("step_number")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as usize,
                    description: rs
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    sources: rs
                        .get("sources")
                        .and_then(Value::as_array)
                        .map(|s| {
                            s.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let cf = data.get("confidence_factors");
    let factor = |name: &str| -> f64 {
        cf.and_then(|c| c.get(name))
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
    };

    ExpertResponse {
        expert_type: expert_type.to_string(),
        interpretation: data
            .get("interpretation")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        legal_basis,
        reasoning_steps,
        confidence: data
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5),
        confidence_factors: ConfidenceFactors {
            norm_clarity: factor("norm_clarity"),
            jurisprudence_alignment: factor("jurisprudence_alignment"),
            contextual_ambiguity: factor("contextual_ambiguity"),
            source_availability: factor("source_availability"),
        },
        limitations: data
            .get("limitations")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        trace_id: trace_id.to_string(),
        execution_time_ms: 0.0,
        tokens_used: 0,
        timestamp: crate::model::now_iso(),
        metadata: Default::default(),
    }
}
