//! Multi-expert orchestrator
//!
//! End-to-end query executor:
//!     query -> router -> selected experts (parallel, per-expert deadline)
//!           -> gating -> aggregated response + sealed trace
//!
//! No expert failure is fatal: timeouts and errors become stub responses and
//! aggregation proceeds with whatever completed.

use crate::config::{ExpertsFile, OrchestratorSettings};
use crate::experts::gating::{AggregatedResponse, AggregationMethod, GatingNetwork};
use crate::experts::router::{QueryRouter, RoutingDecision};
use crate::experts::Expert;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::model::{new_trace_id, ExpertContext, ExpertKind, ExpertResponse};
use crate::tools::ToolRegistry;
use crate::trace::{extract_article_citations, ConfigSnapshot, TraceCollector, TraceDocument};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-query options for `interpret`
#[derive(Debug, Clone)]
pub struct InterpretOptions {
    pub max_experts: Option<usize>,
    pub aggregation_method: Option<AggregationMethod>,
    pub timeout: Option<Duration>,
    /// When false, experts use only the pre-retrieved chunks and skip search
    pub include_search: bool,
    pub hint_entities: Option<HashMap<String, Vec<String>>>,
    pub pre_retrieved_chunks: Vec<Value>,
    /// Force sequential dispatch regardless of the routing decision
    pub sequential: bool,
    /// Also run the no-retrieval baseline for the trace comparison
    pub run_baseline: bool,
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            max_experts: None,
            aggregation_method: None,
            timeout: None,
            include_search: true,
            hint_entities: None,
            pre_retrieved_chunks: Vec::new(),
            sequential: false,
            run_baseline: false,
        }
    }
}

/// Aggregated response plus the sealed trace of the invocation
#[derive(Debug, Clone)]
pub struct OrchestratorOutcome {
    pub response: AggregatedResponse,
    pub trace: TraceDocument,
}

/// Orchestrator over the four interpretive experts
pub struct Orchestrator {
    experts: HashMap<ExpertKind, Arc<Expert>>,
    router: QueryRouter,
    settings: OrchestratorSettings,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl Orchestrator {
    /// Build the orchestrator with all four experts sharing one tool registry
    pub fn new(
        tools: Arc<ToolRegistry>,
        llm: Option<Arc<dyn LanguageModel>>,
        experts_file: &ExpertsFile,
        router: QueryRouter,
        settings: OrchestratorSettings,
    ) -> Self {
        let experts = ExpertKind::ALL
            .iter()
            .map(|kind| {
                let expert = Expert::new(
                    *kind,
                    &experts_file.settings_for(kind.as_str()),
                    &experts_file.defaults,
                    tools.clone(),
                    llm.clone(),
                );
                (*kind, Arc::new(expert))
            })
            .collect();

        tracing::info!(
            tools = tools.len(),
            has_llm = llm.is_some(),
            "orchestrator initialized"
        );

        Self {
            experts,
            router,
            settings,
            llm,
        }
    }

    pub fn expert(&self, kind: ExpertKind) -> Option<&Arc<Expert>> {
        self.experts.get(&kind)
    }

    /// Process a query through the full pipeline.
    pub async fn interpret(&self, query: &str, opts: InterpretOptions) -> OrchestratorOutcome {
        let start = Instant::now();
        let trace_id = new_trace_id();
        let trace = TraceCollector::new(trace_id.clone(), query);
        trace.set_config_snapshot(ConfigSnapshot::capture(&self.settings));

        let preview: String = query.chars().take(50).collect();
        tracing::info!(query = preview.as_str(), trace_id = trace_id.as_str(), "processing query");

        let mut context = ExpertContext::new(query);
        context.trace_id = trace_id.clone();
        if let Some(entities) = opts.hint_entities.clone() {
            context.entities = entities;
        }
        context.retrieved_chunks = opts.pre_retrieved_chunks.clone();
        context
            .metadata
            .insert("include_search".to_string(), json!(opts.include_search));

        // Routing
        let routing = self.router.route(&context);
        trace.set_routing(serde_json::to_value(&routing).unwrap_or(Value::Null));

        // Expert selection, with the equal-weights fallback
        let max_experts = opts.max_experts.unwrap_or(self.settings.max_experts);
        let mut selected = routing.selected_experts(self.settings.selection_threshold);
        selected.truncate(max_experts);
        if selected.is_empty() {
            let equal = 1.0 / ExpertKind::ALL.len() as f64;
            selected = ExpertKind::ALL.iter().map(|k| (*k, equal)).collect();
            selected.truncate(max_experts.max(1));
        }

        tracing::info!(
            experts = ?selected.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            "experts selected"
        );

        // Dispatch
        let timeout = opts
            .timeout
            .unwrap_or_else(|| Duration::from_secs_f64(self.settings.timeout_seconds));
        let parallel =
            !opts.sequential && self.settings.parallel_execution && routing.parallel;

        let responses = if parallel {
            self.run_parallel(&selected, &context, &trace, timeout).await
        } else {
            self.run_sequential(&selected, &context, &trace, timeout).await
        };

        for response in &responses {
            trace.add_expert_result(
                &response.expert_type,
                serde_json::to_value(response).unwrap_or(Value::Null),
            );
        }

        // Baseline comparison, outside the main pipeline
        if opts.run_baseline {
            self.run_baseline(query, &trace).await;
        }

        // Aggregate
        let method = opts.aggregation_method.unwrap_or_else(|| {
            AggregationMethod::parse(&self.settings.aggregation_method)
                .unwrap_or(AggregationMethod::WeightedAverage)
        });
        let gating = GatingNetwork::new(method, self.llm.clone(), None);
        let weights: HashMap<ExpertKind, f64> = selected.iter().copied().collect();

        let all_failed = responses.iter().all(|r| r.confidence == 0.0);
        let mut aggregated = if all_failed {
            // Every expert timed out or errored: no interpretation to merge
            let mut degraded = gating.aggregate(&[], &weights, &trace_id, Some(&trace)).await;
            degraded.expert_contributions = responses
                .iter()
                .map(|r| {
                    (
                        r.expert_type.clone(),
                        json!({
                            "interpretation": r.interpretation,
                            "confidence": r.confidence,
                            "limitations": r.limitations,
                        }),
                    )
                })
                .collect();
            degraded
        } else {
            gating.aggregate(&responses, &weights, &trace_id, Some(&trace)).await
        };
        aggregated.execution_time_ms = start.elapsed().as_millis() as f64;

        trace.set_aggregation(serde_json::to_value(&aggregated).unwrap_or(Value::Null));
        let trace_doc = trace.finish(&aggregated.combined_legal_basis);

        tracing::info!(
            trace_id = trace_id.as_str(),
            experts_run = responses.len(),
            confidence = aggregated.confidence,
            time_ms = aggregated.execution_time_ms,
            "query processed"
        );

        OrchestratorOutcome {
            response: aggregated,
            trace: trace_doc,
        }
    }

    /// Route only, without running experts. Exposed for diagnostics.
    pub fn route(&self, query: &str) -> RoutingDecision {
        self.router.route(&ExpertContext::new(query))
    }

    /// Run one specific expert, bypassing routing.
    pub async fn run_single_expert(
        &self,
        kind: ExpertKind,
        query: &str,
        opts: InterpretOptions,
    ) -> ExpertResponse {
        let trace = TraceCollector::new(new_trace_id(), query);
        let mut context = ExpertContext::new(query);
        if let Some(entities) = opts.hint_entities {
            context.entities = entities;
        }
        context.retrieved_chunks = opts.pre_retrieved_chunks;

        match self.experts.get(&kind) {
            Some(expert) => expert.analyze(&context, &trace).await,
            None => ExpertResponse::degraded(
                kind.as_str(),
                format!("Expert '{}' non trovato", kind.as_str()),
                "expert not configured",
                &context.trace_id,
            ),
        }
    }

    async fn run_parallel(
        &self,
        selected: &[(ExpertKind, f64)],
        context: &ExpertContext,
        trace: &TraceCollector,
        timeout: Duration,
    ) -> Vec<ExpertResponse> {
        let tasks = selected.iter().filter_map(|(kind, _)| {
            self.experts.get(kind).map(|expert| {
                let expert = expert.clone();
                async move { run_with_deadline(&expert, context, trace, timeout).await }
            })
        });

        futures::future::join_all(tasks).await
    }

    async fn run_sequential(
        &self,
        selected: &[(ExpertKind, f64)],
        context: &ExpertContext,
        trace: &TraceCollector,
        timeout: Duration,
    ) -> Vec<ExpertResponse> {
        let mut responses = Vec::new();
        for (kind, _) in selected {
            if let Some(expert) = self.experts.get(kind) {
                responses.push(run_with_deadline(expert, context, trace, timeout).await);
            }
        }
        responses
    }

    /// No-retrieval baseline answer on the bare query, recorded in the trace.
    /// Shares no state with the expert pipeline.
    async fn run_baseline(&self, query: &str, trace: &TraceCollector) {
        let Some(ref llm) = self.llm else {
            return;
        };

        let prompt = format!(
            "Sei un esperto di diritto civile italiano.\n\
             Rispondi alla seguente domanda giuridica citando gli articoli di legge rilevanti.\n\n\
             DOMANDA: {}\n\n\
             Fornisci una risposta concisa (max 300 parole) con:\n\
             1. La risposta alla domanda\n\
             2. Gli articoli di legge pertinenti\n\
             3. Eventuali principi giuridici applicabili",
            query
        );

        let start = Instant::now();
        match llm.generate(CompletionRequest::new(prompt)).await {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as f64;
                let cited = extract_article_citations(&response.content);
                trace.set_baseline(&response.content, latency_ms, cited);
            }
            Err(e) => {
                tracing::warn!(error = %e, "baseline call failed");
            }
        }
    }
}

/// Run one expert under its deadline, degrading to a stub on expiry
async fn run_with_deadline(
    expert: &Expert,
    context: &ExpertContext,
    trace: &TraceCollector,
    timeout: Duration,
) -> ExpertResponse {
    match tokio::time::timeout(timeout, expert.analyze(context, trace)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(expert = expert.kind().as_str(), "expert timed out");
            ExpertResponse::degraded(
                expert.kind().as_str(),
                "Timeout durante l'analisi",
                "Timeout",
                &context.trace_id,
            )
        }
    }
}
