//! Gating network: aggregates expert responses
//!
//! Four aggregation policies:
//! - weighted_average: weighted contributions plus combined sources/reasoning
//! - best_confidence: the single highest-confidence response verbatim
//! - consensus: sources cited by two or more experts
//! - ensemble: every perspective kept under its own heading

use crate::llm::{CompletionRequest, LanguageModel};
use crate::model::{ExpertKind, ExpertResponse, LegalSource, ReasoningStep};
use crate::trace::TraceCollector;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Aggregation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    WeightedAverage,
    BestConfidence,
    Consensus,
    Ensemble,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedAverage => "weighted_average",
            Self::BestConfidence => "best_confidence",
            Self::Consensus => "consensus",
            Self::Ensemble => "ensemble",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weighted_average" => Some(Self::WeightedAverage),
            "best_confidence" => Some(Self::BestConfidence),
            "consensus" => Some(Self::Consensus),
            "ensemble" => Some(Self::Ensemble),
            _ => None,
        }
    }
}

/// Bounds applied to combined material
const MAX_COMBINED_BASIS: usize = 10;
const MAX_COMBINED_REASONING: usize = 15;
const MAX_ENSEMBLE_BASIS: usize = 15;

/// Aggregated response from multiple experts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub synthesis: String,
    pub expert_contributions: HashMap<String, Value>,
    pub combined_legal_basis: Vec<LegalSource>,
    pub combined_reasoning: Vec<ReasoningStep>,
    pub confidence: f64,
    pub confidence_breakdown: HashMap<String, f64>,
    pub conflicts: Vec<String>,
    pub aggregation_method: String,
    pub trace_id: String,
    pub execution_time_ms: f64,
    pub timestamp: String,
}

/// Gating network over expert responses
pub struct GatingNetwork {
    method: AggregationMethod,
    llm: Option<Arc<dyn LanguageModel>>,
    model: Option<String>,
}

impl GatingNetwork {
    pub fn new(
        method: AggregationMethod,
        llm: Option<Arc<dyn LanguageModel>>,
        model: Option<String>,
    ) -> Self {
        tracing::info!(method = method.as_str(), "gating network initialized");
        Self { method, llm, model }
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }

    /// Aggregate responses under this network's policy.
    ///
    /// Weights are re-normalized over the experts actually present; an empty
    /// response set degrades to a zero-confidence aggregate.
    pub async fn aggregate(
        &self,
        responses: &[ExpertResponse],
        weights: &HashMap<ExpertKind, f64>,
        trace_id: &str,
        trace: Option<&TraceCollector>,
    ) -> AggregatedResponse {
        let start = Instant::now();

        if responses.is_empty() {
            return AggregatedResponse {
                synthesis: "Nessuna risposta da aggregare".to_string(),
                expert_contributions: HashMap::new(),
                combined_legal_basis: Vec::new(),
                combined_reasoning: Vec::new(),
                confidence: 0.0,
                confidence_breakdown: HashMap::new(),
                conflicts: vec!["nessun expert ha prodotto una risposta".to_string()],
                aggregation_method: self.method.as_str().to_string(),
                trace_id: trace_id.to_string(),
                execution_time_ms: start.elapsed().as_millis() as f64,
                timestamp: crate::model::now_iso(),
            };
        }

        tracing::info!(
            responses = responses.len(),
            method = self.method.as_str(),
            trace_id,
            "aggregating"
        );

        let normalized = normalize_weights(responses, weights);
        let sorted = sort_by_weight(responses, &normalized);

        let mut result = match self.method {
            AggregationMethod::WeightedAverage => {
                self.aggregate_weighted(&sorted, &normalized, trace).await
            }
            AggregationMethod::BestConfidence => self.aggregate_best(&sorted),
            AggregationMethod::Consensus => {
                self.aggregate_consensus(&sorted, &normalized, trace).await
            }
            AggregationMethod::Ensemble => self.aggregate_ensemble(&sorted, &normalized),
        };

        result.trace_id = trace_id.to_string();
        result.execution_time_ms = start.elapsed().as_millis() as f64;

        tracing::info!(
            confidence = result.confidence,
            conflicts = result.conflicts.len(),
            "aggregation completed"
        );

        result
    }

    async fn aggregate_weighted(
        &self,
        sorted: &[&ExpertResponse],
        weights: &HashMap<ExpertKind, f64>,
        trace: Option<&TraceCollector>,
    ) -> AggregatedResponse {
        let mut contributions = HashMap::new();
        let mut confidence_breakdown = HashMap::new();
        let mut weighted_confidence = 0.0;

        for resp in sorted {
            let w = weight_of(weights, &resp.expert_type);
            let weighted = resp.confidence * w;
            weighted_confidence += weighted;
            confidence_breakdown.insert(resp.expert_type.clone(), weighted);
            contributions.insert(
                resp.expert_type.clone(),
                json!({
                    "interpretation": resp.interpretation,
                    "confidence": resp.confidence,
                    "weight": w,
                    "weighted_confidence": weighted,
                }),
            );
        }

        // Combined sources: iterate experts by descending weight, dedupe by id
        let mut combined_basis = Vec::new();
        let mut seen_ids = HashSet::new();
        for resp in sorted {
            for lb in &resp.legal_basis {
                if seen_ids.insert(lb.source_id.clone()) {
                    combined_basis.push(lb.clone());
                }
            }
        }
        combined_basis.truncate(MAX_COMBINED_BASIS);

        let mut combined_reasoning = Vec::new();
        let mut step_number = 1;
        for resp in sorted {
            for rs in &resp.reasoning_steps {
                combined_reasoning.push(ReasoningStep {
                    step_number,
                    description: format!("[{}] {}", resp.expert_type, rs.description),
                    sources: rs.sources.clone(),
                });
                step_number += 1;
            }
        }
        combined_reasoning.truncate(MAX_COMBINED_REASONING);

        let conflicts = detect_conflicts(sorted);
        let synthesis = self.synthesize(sorted, weights, "balanced", trace).await;

        AggregatedResponse {
            synthesis,
            expert_contributions: contributions,
            combined_legal_basis: combined_basis,
            combined_reasoning,
            confidence: weighted_confidence,
            confidence_breakdown,
            conflicts,
            aggregation_method: "weighted_average".to_string(),
            trace_id: String::new(),
            execution_time_ms: 0.0,
            timestamp: crate::model::now_iso(),
        }
    }

    fn aggregate_best(&self, sorted: &[&ExpertResponse]) -> AggregatedResponse {
        let best = sorted
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty responses");

        let contributions = sorted
            .iter()
            .map(|r| {
                (
                    r.expert_type.clone(),
                    json!({
                        "interpretation": r.interpretation,
                        "confidence": r.confidence,
                        "selected": r.expert_type == best.expert_type,
                    }),
                )
            })
            .collect();

        AggregatedResponse {
            synthesis: best.interpretation.clone(),
            expert_contributions: contributions,
            combined_legal_basis: best.legal_basis.clone(),
            combined_reasoning: best.reasoning_steps.clone(),
            confidence: best.confidence,
            confidence_breakdown: HashMap::from([(best.expert_type.clone(), best.confidence)]),
            conflicts: Vec::new(),
            aggregation_method: "best_confidence".to_string(),
            trace_id: String::new(),
            execution_time_ms: 0.0,
            timestamp: crate::model::now_iso(),
        }
    }

    async fn aggregate_consensus(
        &self,
        sorted: &[&ExpertResponse],
        weights: &HashMap<ExpertKind, f64>,
        trace: Option<&TraceCollector>,
    ) -> AggregatedResponse {
        // Count distinct citing experts per source
        let mut counts: HashMap<&str, (&LegalSource, HashSet<&str>)> = HashMap::new();
        for resp in sorted {
            for lb in &resp.legal_basis {
                counts
                    .entry(lb.source_id.as_str())
                    .or_insert((lb, HashSet::new()))
                    .1
                    .insert(resp.expert_type.as_str());
            }
        }

        let distinct_total = counts.len();
        let mut consensus_sources: Vec<LegalSource> = counts
            .values()
            .filter(|(_, experts)| experts.len() >= 2)
            .map(|(lb, _)| (*lb).clone())
            .collect();
        consensus_sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        consensus_sources.truncate(MAX_COMBINED_BASIS);

        let confidence = if consensus_sources.is_empty() {
            0.4
        } else {
            (consensus_sources.len() as f64 / distinct_total.max(1) as f64 + 0.3).min(1.0)
        };

        let contributions = sorted
            .iter()
            .map(|r| {
                (
                    r.expert_type.clone(),
                    json!({
                        "interpretation": r.interpretation,
                        "confidence": r.confidence,
                        "weight": weight_of(weights, &r.expert_type),
                    }),
                )
            })
            .collect();

        let synthesis = if self.llm.is_some() {
            self.synthesize(sorted, weights, "consensus", trace).await
        } else {
            synthesize_consensus_template(sorted, &consensus_sources)
        };

        AggregatedResponse {
            synthesis,
            expert_contributions: contributions,
            combined_legal_basis: consensus_sources,
            combined_reasoning: Vec::new(),
            confidence,
            confidence_breakdown: sorted
                .iter()
                .map(|r| (r.expert_type.clone(), r.confidence))
                .collect(),
            conflicts: detect_conflicts(sorted),
            aggregation_method: "consensus".to_string(),
            trace_id: String::new(),
            execution_time_ms: 0.0,
            timestamp: crate::model::now_iso(),
        }
    }

    fn aggregate_ensemble(
        &self,
        sorted: &[&ExpertResponse],
        weights: &HashMap<ExpertKind, f64>,
    ) -> AggregatedResponse {
        let mut contributions = HashMap::new();
        let mut sections = Vec::new();

        for resp in sorted {
            contributions.insert(
                resp.expert_type.clone(),
                json!({
                    "interpretation": resp.interpretation,
                    "confidence": resp.confidence,
                    "weight": weight_of(weights, &resp.expert_type),
                    "limitations": resp.limitations,
                }),
            );
            sections.push(format!(
                "## {}\n{}",
                resp.expert_type.to_uppercase(),
                resp.interpretation
            ));
        }

        let mut combined_basis = Vec::new();
        let mut seen = HashSet::new();
        for resp in sorted {
            for lb in &resp.legal_basis {
                if seen.insert(lb.source_id.clone()) {
                    combined_basis.push(lb.clone());
                }
            }
        }
        combined_basis.truncate(MAX_ENSEMBLE_BASIS);

        let avg_confidence =
            sorted.iter().map(|r| r.confidence).sum::<f64>() / sorted.len() as f64;

        AggregatedResponse {
            synthesis: sections.join("\n\n"),
            expert_contributions: contributions,
            combined_legal_basis: combined_basis,
            combined_reasoning: Vec::new(),
            confidence: avg_confidence,
            confidence_breakdown: sorted
                .iter()
                .map(|r| (r.expert_type.clone(), r.confidence))
                .collect(),
            conflicts: detect_conflicts(sorted),
            aggregation_method: "ensemble".to_string(),
            trace_id: String::new(),
            execution_time_ms: 0.0,
            timestamp: crate::model::now_iso(),
        }
    }

    /// LLM synthesis with deterministic template fallback
    async fn synthesize(
        &self,
        sorted: &[&ExpertResponse],
        weights: &HashMap<ExpertKind, f64>,
        focus: &str,
        trace: Option<&TraceCollector>,
    ) -> String {
        let Some(ref llm) = self.llm else {
            return synthesize_template(sorted, weights);
        };

        let prompt = build_synthesis_prompt(sorted, weights, focus);
        let request = CompletionRequest::new(prompt.clone()).with_temperature(0.3);
        let request = match self.model {
            Some(ref model) => request.with_model(model.clone()),
            None => request,
        };

        let start = Instant::now();
        match llm.generate(request).await {
            Ok(response) => {
                if let Some(trace) = trace {
                    trace.add_llm_call(
                        "gating",
                        &prompt,
                        &response.content,
                        response.total_tokens,
                        start.elapsed().as_millis() as f64,
                    );
                }
                response.content
            }
            Err(e) => {
                tracing::error!(error = %e, "LLM synthesis failed");
                synthesize_template(sorted, weights)
            }
        }
    }
}

fn weight_of(weights: &HashMap<ExpertKind, f64>, expert_type: &str) -> f64 {
    ExpertKind::parse(expert_type)
        .and_then(|k| weights.get(&k))
        .copied()
        .unwrap_or(0.0)
}

/// Restrict weights to the experts present and re-normalize to sum 1
fn normalize_weights(
    responses: &[ExpertResponse],
    weights: &HashMap<ExpertKind, f64>,
) -> HashMap<ExpertKind, f64> {
    let present: HashSet<ExpertKind> = responses
        .iter()
        .filter_map(|r| ExpertKind::parse(&r.expert_type))
        .collect();

    let filtered: HashMap<ExpertKind, f64> = weights
        .iter()
        .filter(|(k, _)| present.contains(k))
        .map(|(k, v)| (*k, *v))
        .collect();

    let total: f64 = filtered.values().sum();
    if total > 0.0 {
        filtered.into_iter().map(|(k, v)| (k, v / total)).collect()
    } else {
        present
            .into_iter()
            .map(|k| (k, 1.0 / responses.len() as f64))
            .collect()
    }
}

/// Sort responses by weight descending; expert name breaks ties so the output
/// is deterministic for identical inputs.
fn sort_by_weight<'a>(
    responses: &'a [ExpertResponse],
    weights: &HashMap<ExpertKind, f64>,
) -> Vec<&'a ExpertResponse> {
    let mut sorted: Vec<&ExpertResponse> = responses.iter().collect();
    sorted.sort_by(|a, b| {
        let wa = weight_of(weights, &a.expert_type);
        let wb = weight_of(weights, &b.expert_type);
        wb.partial_cmp(&wa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.expert_type.cmp(&b.expert_type))
    });
    sorted
}

/// Divergence in confidence and poor source overlap between experts
fn detect_conflicts(responses: &[&ExpertResponse]) -> Vec<String> {
    let mut conflicts = Vec::new();
    if responses.len() < 2 {
        return conflicts;
    }

    let high = responses
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("non-empty");
    let low = responses
        .iter()
        .min_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("non-empty");

    if high.confidence - low.confidence > 0.4 {
        conflicts.push(format!(
            "Divergenza significativa: {} ({:.2}) vs {} ({:.2})",
            high.expert_type, high.confidence, low.expert_type, low.confidence
        ));
    }

    let source_sets: Vec<HashSet<&str>> = responses
        .iter()
        .map(|r| r.legal_basis.iter().map(|lb| lb.source_id.as_str()).collect())
        .collect();

    if source_sets.iter().all(|s| !s.is_empty()) {
        let mut intersection = source_sets[0].clone();
        let mut union = source_sets[0].clone();
        for set in &source_sets[1..] {
            intersection = intersection.intersection(set).copied().collect();
            union = union.union(set).copied().collect();
        }
        if !union.is_empty() && (intersection.len() as f64 / union.len() as f64) < 0.2 {
            conflicts.push("Fonti giuridiche poco sovrapposte tra expert".to_string());
        }
    }

    conflicts
}

/// Deterministic synthesis used when no LLM is available
fn synthesize_template(
    sorted: &[&ExpertResponse],
    weights: &HashMap<ExpertKind, f64>,
) -> String {
    let mut sections = vec!["# Sintesi Multi-Expert\n".to_string()];

    for resp in sorted {
        let w = weight_of(weights, &resp.expert_type);
        sections.push(format!(
            "## {} (peso: {:.2}, confidenza: {:.2})",
            capitalize(&resp.expert_type),
            w,
            resp.confidence
        ));
        let mut interp: String = resp.interpretation.chars().take(500).collect();
        if resp.interpretation.chars().count() > 500 {
            interp.push_str("...");
        }
        sections.push(interp);
        sections.push(String::new());
    }

    sections.push(
        "\n*Nota: sintesi generata senza AI - combinazione meccanica delle interpretazioni*"
            .to_string(),
    );
    sections.join("\n")
}

fn synthesize_consensus_template(
    responses: &[&ExpertResponse],
    consensus_sources: &[LegalSource],
) -> String {
    let mut sections = vec!["# Punti di Consenso\n".to_string()];

    if consensus_sources.is_empty() {
        sections.push("Nessuna fonte citata da più Expert.".to_string());
    } else {
        sections.push("## Fonti su cui gli Expert concordano:".to_string());
        for lb in consensus_sources.iter().take(5) {
            let excerpt: String = lb.excerpt.chars().take(200).collect();
            sections.push(format!("- {}: {}...", lb.citation, excerpt));
        }
    }

    sections.push("\n## Interpretazioni:".to_string());
    for resp in responses {
        let interp: String = resp.interpretation.chars().take(300).collect();
        sections.push(format!("- **{}**: {}...", resp.expert_type, interp));
    }

    sections.join("\n")
}

fn build_synthesis_prompt(
    sorted: &[&ExpertResponse],
    weights: &HashMap<ExpertKind, f64>,
    focus: &str,
) -> String {
    let mut sections = vec![
        "Sei un giurista esperto. Sintetizza le seguenti interpretazioni da diversi \
         approcci ermeneutici in una risposta coerente e completa.\n"
            .to_string(),
    ];

    if focus == "consensus" {
        sections.push("FOCUS: evidenzia i punti di accordo tra gli expert.\n".to_string());
    }

    for resp in sorted {
        let w = weight_of(weights, &resp.expert_type);
        sections.push(format!("## {} (peso: {:.2})", resp.expert_type.to_uppercase(), w));
        sections.push(format!("Confidenza: {:.2}", resp.confidence));
        sections.push(format!("Interpretazione: {}", resp.interpretation));
        if !resp.legal_basis.is_empty() {
            let citations: Vec<&str> = resp
                .legal_basis
                .iter()
                .take(3)
                .map(|lb| lb.citation.as_str())
                .collect();
            sections.push(format!("Fonti: {}", citations.join(", ")));
        }
        sections.push(String::new());
    }

    sections.push(
        "\nProduci una SINTESI in italiano che:\n\
         1. Integri le diverse prospettive\n\
         2. Evidenzi eventuali divergenze\n\
         3. Citi le fonti più rilevanti\n\
         4. Sia chiara e utilizzabile"
            .to_string(),
    );

    sections.join("\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConfidenceFactors;

    fn response(expert: &str, confidence: f64, sources: &[&str]) -> ExpertResponse {
        ExpertResponse {
            expert_type: expert.to_string(),
            interpretation: format!("Interpretazione secondo il canone {}", expert),
            legal_basis: sources
                .iter()
                .map(|id| LegalSource {
                    source_type: "norm".to_string(),
                    source_id: id.to_string(),
                    citation: format!("cit. {}", id),
                    excerpt: String::new(),
                    relevance: String::new(),
                })
                .collect(),
            reasoning_steps: vec![ReasoningStep {
                step_number: 1,
                description: format!("passo di {}", expert),
                sources: sources.iter().map(|s| s.to_string()).collect(),
            }],
            confidence,
            confidence_factors: ConfidenceFactors::default(),
            limitations: String::new(),
            trace_id: "t".to_string(),
            execution_time_ms: 0.0,
            tokens_used: 0,
            timestamp: crate::model::now_iso(),
            metadata: Default::default(),
        }
    }

    fn weights(pairs: &[(ExpertKind, f64)]) -> HashMap<ExpertKind, f64> {
        pairs.iter().copied().collect()
    }

    fn gating(method: AggregationMethod) -> GatingNetwork {
        GatingNetwork::new(method, None, None)
    }

    #[tokio::test]
    async fn empty_responses_degrade() {
        let result = gating(AggregationMethod::WeightedAverage)
            .aggregate(&[], &HashMap::new(), "t", None)
            .await;
        assert_eq!(result.synthesis, "Nessuna risposta da aggregare");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn weighted_average_confidence_and_dedup() {
        let responses = vec![
            response("literal", 0.8, &["urn:a", "urn:b"]),
            response("precedent", 0.6, &["urn:b", "urn:c"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.75), (ExpertKind::Precedent, 0.25)]);

        let result = gating(AggregationMethod::WeightedAverage)
            .aggregate(&responses, &w, "t", None)
            .await;

        // 0.75 * 0.8 + 0.25 * 0.6
        assert!((result.confidence - 0.75).abs() < 1e-9);

        // No duplicate source ids in the combined basis
        let ids: Vec<&str> = result
            .combined_legal_basis
            .iter()
            .map(|lb| lb.source_id.as_str())
            .collect();
        let unique: HashSet<&&str> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(ids.len(), 3);

        // Reasoning steps renumbered and prefixed with the expert type
        assert_eq!(result.combined_reasoning[0].step_number, 1);
        assert!(result.combined_reasoning[0].description.starts_with("[literal]"));

        // Deterministic template synthesis when no LLM configured
        assert!(result.synthesis.contains("Sintesi Multi-Expert"));
    }

    #[tokio::test]
    async fn weights_renormalize_over_present_experts() {
        let responses = vec![response("literal", 0.8, &["urn:a"])];
        // systemic never responded but carries weight
        let w = weights(&[(ExpertKind::Literal, 0.25), (ExpertKind::Systemic, 0.75)]);

        let result = gating(AggregationMethod::WeightedAverage)
            .aggregate(&responses, &w, "t", None)
            .await;

        // literal is the only respondent, so its normalized weight is 1
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn best_confidence_picks_verbatim() {
        let responses = vec![
            response("literal", 0.5, &["urn:a"]),
            response("precedent", 0.9, &["urn:b"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.5), (ExpertKind::Precedent, 0.5)]);

        let result = gating(AggregationMethod::BestConfidence)
            .aggregate(&responses, &w, "t", None)
            .await;

        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert!(result.synthesis.contains("precedent"));
        assert_eq!(result.combined_legal_basis.len(), 1);
        assert_eq!(result.combined_legal_basis[0].source_id, "urn:b");
        assert_eq!(
            result.expert_contributions["precedent"]["selected"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn consensus_counts_distinct_citing_experts() {
        let responses = vec![
            response("literal", 0.7, &["urn:a", "urn:b"]),
            response("systemic", 0.6, &["urn:a", "urn:c"]),
            response("precedent", 0.5, &["urn:a"]),
        ];
        let w = weights(&[
            (ExpertKind::Literal, 0.4),
            (ExpertKind::Systemic, 0.3),
            (ExpertKind::Precedent, 0.3),
        ]);

        let result = gating(AggregationMethod::Consensus)
            .aggregate(&responses, &w, "t", None)
            .await;

        assert_eq!(result.combined_legal_basis.len(), 1);
        assert_eq!(result.combined_legal_basis[0].source_id, "urn:a");
        // 1 consensus source over 3 distinct + 0.3
        assert!((result.confidence - (1.0 / 3.0 + 0.3)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn consensus_without_shared_sources() {
        let responses = vec![
            response("literal", 0.7, &["urn:a"]),
            response("systemic", 0.6, &["urn:b"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.5), (ExpertKind::Systemic, 0.5)]);

        let result = gating(AggregationMethod::Consensus)
            .aggregate(&responses, &w, "t", None)
            .await;

        assert!(result.combined_legal_basis.is_empty());
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert!(result.synthesis.contains("Nessuna fonte citata da più Expert"));
    }

    #[tokio::test]
    async fn ensemble_keeps_all_perspectives() {
        let responses = vec![
            response("literal", 0.8, &["urn:a"]),
            response("principles", 0.4, &["urn:b"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.6), (ExpertKind::Principles, 0.4)]);

        let result = gating(AggregationMethod::Ensemble)
            .aggregate(&responses, &w, "t", None)
            .await;

        assert!(result.synthesis.contains("## LITERAL"));
        assert!(result.synthesis.contains("## PRINCIPLES"));
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn conflict_detection_divergence_and_overlap() {
        let responses = vec![
            response("literal", 0.9, &["urn:s1", "urn:s2"]),
            response("systemic", 0.4, &["urn:s3", "urn:s4"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.5), (ExpertKind::Systemic, 0.5)]);

        let result = gating(AggregationMethod::WeightedAverage)
            .aggregate(&responses, &w, "t", None)
            .await;

        assert_eq!(result.conflicts.len(), 2);
        assert!(result.conflicts[0].contains("Divergenza significativa"));
        assert!(result.conflicts[0].contains("literal"));
        assert!(result.conflicts[0].contains("systemic"));
        assert!(result.conflicts[1].contains("poco sovrapposte"));
    }

    #[tokio::test]
    async fn no_conflicts_with_aligned_experts() {
        let responses = vec![
            response("literal", 0.8, &["urn:a", "urn:b"]),
            response("systemic", 0.7, &["urn:a", "urn:b"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.5), (ExpertKind::Systemic, 0.5)]);

        let result = gating(AggregationMethod::WeightedAverage)
            .aggregate(&responses, &w, "t", None)
            .await;
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn deterministic_given_identical_inputs() {
        let responses = vec![
            response("literal", 0.8, &["urn:a"]),
            response("precedent", 0.6, &["urn:b"]),
        ];
        let w = weights(&[(ExpertKind::Literal, 0.6), (ExpertKind::Precedent, 0.4)]);

        let g = gating(AggregationMethod::WeightedAverage);
        let a = g.aggregate(&responses, &w, "t", None).await;
        let b = g.aggregate(&responses, &w, "t", None).await;

        assert_eq!(a.synthesis, b.synthesis);
        assert_eq!(
            a.combined_legal_basis
                .iter()
                .map(|s| s.source_id.clone())
                .collect::<Vec<_>>(),
            b.combined_legal_basis
                .iter()
                .map(|s| s.source_id.clone())
                .collect::<Vec<_>>()
        );
        assert!((a.confidence - b.confidence).abs() < 1e-12);
    }

    #[test]
    fn aggregation_method_parse() {
        assert_eq!(
            AggregationMethod::parse("weighted_average"),
            Some(AggregationMethod::WeightedAverage)
        );
        assert_eq!(
            AggregationMethod::parse("best_confidence"),
            Some(AggregationMethod::BestConfidence)
        );
        assert_eq!(AggregationMethod::parse("nope"), None);
    }
}
