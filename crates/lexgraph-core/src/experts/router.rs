//! Query router
//!
//! Classifies a query into one of seven types by Italian linguistic cues and
//! produces per-expert weights: a base table for the query type, adjusted by
//! extracted entities and keywords, then normalized to sum 1.

use crate::config::RouterWeightsFile;
use crate::model::{ExpertContext, ExpertKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Query classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Definitional,
    Interpretive,
    Procedural,
    Constitutional,
    Jurisprudential,
    Systemic,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definitional => "definitional",
            Self::Interpretive => "interpretive",
            Self::Procedural => "procedural",
            Self::Constitutional => "constitutional",
            Self::Jurisprudential => "jurisprudential",
            Self::Systemic => "systemic",
            Self::General => "general",
        }
    }
}

/// Routing decision for a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub expert_weights: HashMap<ExpertKind, f64>,
    pub query_type: QueryType,
    pub confidence: f64,
    pub reasoning: String,
    pub parallel: bool,
}

impl RoutingDecision {
    /// Experts above the threshold, sorted by weight descending.
    /// Kind order breaks ties so the selection is deterministic.
    pub fn selected_experts(&self, threshold: f64) -> Vec<(ExpertKind, f64)> {
        let mut selected: Vec<(ExpertKind, f64)> = ExpertKind::ALL
            .iter()
            .filter_map(|kind| {
                self.expert_weights
                    .get(kind)
                    .filter(|w| **w >= threshold)
                    .map(|w| (*kind, *w))
            })
            .collect();
        selected.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.as_str().cmp(b.0.as_str()))
        });
        selected
    }
}

struct PatternFamily {
    query_type: QueryType,
    patterns: Vec<Regex>,
}

fn family(query_type: QueryType, patterns: &[&str]) -> PatternFamily {
    PatternFamily {
        query_type,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("router pattern"))
            .collect(),
    }
}

lazy_static! {
    static ref PATTERN_FAMILIES: Vec<PatternFamily> = vec![
        family(QueryType::Definitional, &[
            r"cos['\s]?[eè]\s",
            r"definizione\s+di",
            r"cosa\s+(si\s+)?intende\s+per",
            r"significato\s+di",
            r"nozione\s+di",
        ]),
        family(QueryType::Interpretive, &[
            r"come\s+(si\s+)?interpreta",
            r"interpretazione\s+di",
            r"senso\s+di",
            r"portata\s+di",
            r"ambito\s+di\s+applicazione",
        ]),
        family(QueryType::Procedural, &[
            r"come\s+(si\s+)?fa",
            r"procedura\s+per",
            r"termini\s+per",
            r"modalit[aà]\s+di",
            r"adempimenti",
        ]),
        family(QueryType::Constitutional, &[
            r"costituzional",
            r"diritti?\s+fondamental",
            r"libert[aà]\s+",
            r"principi?\s+costituzional",
            r"art\.\s*\d+\s+cost",
        ]),
        family(QueryType::Jurisprudential, &[
            r"cassazione",
            r"giurisprudenz",
            r"orientamento",
            r"sentenz[ae]",
            r"massim[ae]",
            r"precedent[ei]",
        ]),
        family(QueryType::Systemic, &[
            r"relazione\s+tra",
            r"connessione\s+",
            r"coordinamento",
            r"sistema",
            r"evoluzione\s+(storica|normativa)",
        ]),
    ];
}

type WeightTable = HashMap<ExpertKind, f64>;

fn table(literal: f64, systemic: f64, principles: f64, precedent: f64) -> WeightTable {
    HashMap::from([
        (ExpertKind::Literal, literal),
        (ExpertKind::Systemic, systemic),
        (ExpertKind::Principles, principles),
        (ExpertKind::Precedent, precedent),
    ])
}

fn default_query_weights() -> HashMap<QueryType, WeightTable> {
    HashMap::from([
        (QueryType::Definitional, table(0.60, 0.20, 0.10, 0.10)),
        (QueryType::Interpretive, table(0.35, 0.25, 0.20, 0.20)),
        (QueryType::Procedural, table(0.40, 0.20, 0.10, 0.30)),
        (QueryType::Constitutional, table(0.20, 0.20, 0.50, 0.10)),
        (QueryType::Jurisprudential, table(0.15, 0.15, 0.10, 0.60)),
        (QueryType::Systemic, table(0.20, 0.50, 0.15, 0.15)),
        (QueryType::General, table(0.35, 0.25, 0.20, 0.20)),
    ])
}

/// Router from query text to expert weights
pub struct QueryRouter {
    query_weights: HashMap<QueryType, WeightTable>,
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRouter {
    pub fn new() -> Self {
        Self {
            query_weights: default_query_weights(),
        }
    }

    /// Build a router with per-family overrides from the router config file
    pub fn with_config(config: &RouterWeightsFile) -> Self {
        let mut router = Self::new();
        for (family_name, overrides) in &config.gating.query_type_weights {
            let Some(query_type) = parse_query_type(family_name) else {
                tracing::warn!(family = family_name.as_str(), "unknown query type in router config");
                continue;
            };
            let table = router.query_weights.entry(query_type).or_default();
            for (expert_name, weight) in overrides {
                if let Some(kind) = ExpertKind::parse(expert_name) {
                    table.insert(kind, *weight);
                }
            }
        }
        router
    }

    /// Route a query to a weighted subset of experts
    pub fn route(&self, context: &ExpertContext) -> RoutingDecision {
        let query = context.query_text.to_lowercase();

        let (query_type, confidence) = identify_query_type(&query);

        let base = self
            .query_weights
            .get(&query_type)
            .cloned()
            .unwrap_or_else(|| table(0.35, 0.25, 0.20, 0.20));

        let adjusted = adjust_for_entities(base, context);
        let mut weights = adjust_for_keywords(adjusted, &query);

        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for w in weights.values_mut() {
                *w /= total;
            }
        }

        let reasoning = build_reasoning(query_type, context, &weights);

        tracing::info!(
            query_type = query_type.as_str(),
            confidence,
            "router decision"
        );

        RoutingDecision {
            expert_weights: weights,
            query_type,
            confidence,
            reasoning,
            parallel: true,
        }
    }
}

fn parse_query_type(s: &str) -> Option<QueryType> {
    match s {
        "definitional" => Some(QueryType::Definitional),
        "interpretive" => Some(QueryType::Interpretive),
        "procedural" => Some(QueryType::Procedural),
        "constitutional" => Some(QueryType::Constitutional),
        "jurisprudential" => Some(QueryType::Jurisprudential),
        "systemic" => Some(QueryType::Systemic),
        "general" => Some(QueryType::General),
        _ => None,
    }
}

/// Highest-scoring pattern family; general at 0.5 when nothing matches
fn identify_query_type(query: &str) -> (QueryType, f64) {
    let mut best: Option<(QueryType, f64)> = None;

    for family in PATTERN_FAMILIES.iter() {
        let matches = family.patterns.iter().filter(|p| p.is_match(query)).count();
        if matches == 0 {
            continue;
        }
        let score = matches as f64 / family.patterns.len() as f64;
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((family.query_type, score));
        }
    }

    match best {
        Some((query_type, score)) => (query_type, (score * 2.0).min(1.0)),
        None => (QueryType::General, 0.5),
    }
}

const ABSTRACT_CONCEPTS: [&str; 4] = ["principio", "diritto", "libertà", "tutela"];
const JUDGMENT_INDICATORS: [&str; 4] = ["sentenza", "cassazione", "corte", "tribunale"];

fn boost(weights: &mut WeightTable, kind: ExpertKind, factor: f64) {
    if let Some(w) = weights.get_mut(&kind) {
        *w = (*w * factor).min(1.0);
    }
}

fn adjust_for_entities(mut weights: WeightTable, context: &ExpertContext) -> WeightTable {
    if !context.norm_references().is_empty() {
        boost(&mut weights, ExpertKind::Literal, 1.2);
    }

    let has_abstract = context.legal_concepts().iter().any(|c| {
        let lower = c.to_lowercase();
        ABSTRACT_CONCEPTS.iter().any(|a| lower.contains(a))
    });
    if has_abstract {
        boost(&mut weights, ExpertKind::Principles, 1.3);
    }

    let has_judgment = context.norm_references().iter().any(|r| {
        let lower = r.to_lowercase();
        JUDGMENT_INDICATORS.iter().any(|j| lower.contains(j))
    });
    if has_judgment {
        boost(&mut weights, ExpertKind::Precedent, 1.4);
    }

    weights
}

fn adjust_for_keywords(mut weights: WeightTable, query: &str) -> WeightTable {
    if ["storico", "evoluzione", "modifica"].iter().any(|k| query.contains(k)) {
        boost(&mut weights, ExpertKind::Systemic, 1.3);
    }
    if ["ratio", "scopo", "finalità"].iter().any(|k| query.contains(k)) {
        boost(&mut weights, ExpertKind::Principles, 1.3);
    }
    if ["letterale", "testuale", "parola"].iter().any(|k| query.contains(k)) {
        boost(&mut weights, ExpertKind::Literal, 1.3);
    }
    if ["applicazione", "prassi", "giurisprudenza"].iter().any(|k| query.contains(k)) {
        boost(&mut weights, ExpertKind::Precedent, 1.3);
    }
    weights
}

fn build_reasoning(
    query_type: QueryType,
    context: &ExpertContext,
    weights: &WeightTable,
) -> String {
    let mut parts = vec![format!("Query classificata come '{}'.", query_type.as_str())];

    let mut sorted: Vec<(&ExpertKind, &f64)> = weights.iter().collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((kind, weight)) = sorted.first() {
        parts.push(format!("Expert principale: {} ({:.2})", kind.as_str(), weight));
    }

    if !context.norm_references().is_empty() {
        parts.push(format!(
            "Riferimenti normativi: {}",
            context.norm_references().len()
        ));
    }
    if !context.legal_concepts().is_empty() {
        parts.push(format!(
            "Concetti giuridici: {}",
            context.legal_concepts().len()
        ));
    }

    parts.join(" ")
}
