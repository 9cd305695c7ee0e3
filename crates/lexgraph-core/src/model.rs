//! Core data model
//!
//! Per-query value types shared across the retriever, experts, gating and
//! tracing. Everything here is created per query and discarded once the trace
//! is sealed; graph nodes and chunks live in their owning stores.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Globally unique identifier of a retrievable text chunk
pub type ChunkId = Uuid;

/// Opaque graph-node primary key (e.g. "urn:norma:cc:art1453")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeUrn(pub String);

impl NodeUrn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeUrn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeUrn {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeUrn {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of retrievable source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Norma,
    Massima,
    Ratio,
    Spiegazione,
    Principio,
    Articolo,
    Sentenza,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Norma => "norma",
            Self::Massima => "massima",
            Self::Ratio => "ratio",
            Self::Spiegazione => "spiegazione",
            Self::Principio => "principio",
            Self::Articolo => "articolo",
            Self::Sentenza => "sentenza",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "norma" | "norm" => Some(Self::Norma),
            "massima" => Some(Self::Massima),
            "ratio" => Some(Self::Ratio),
            "spiegazione" => Some(Self::Spiegazione),
            "principio" => Some(Self::Principio),
            "articolo" => Some(Self::Articolo),
            "sentenza" => Some(Self::Sentenza),
            _ => None,
        }
    }
}

/// The four interpretive canons, one per expert variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertKind {
    Literal,
    Systemic,
    Principles,
    Precedent,
}

impl ExpertKind {
    pub const ALL: [ExpertKind; 4] = [
        Self::Literal,
        Self::Systemic,
        Self::Principles,
        Self::Precedent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Systemic => "systemic",
            Self::Principles => "principles",
            Self::Precedent => "precedent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "literal" => Some(Self::Literal),
            "systemic" => Some(Self::Systemic),
            "principles" => Some(Self::Principles),
            "precedent" => Some(Self::Precedent),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExpertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graph node linked to a retrieved chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedNode {
    pub graph_node_urn: NodeUrn,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A legal source cited in an expert's reasoning.
///
/// Tracks provenance: every citation must reference a chunk or node actually
/// returned by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalSource {
    /// norm, jurisprudence, doctrine, constitutional
    pub source_type: String,
    /// URN or chunk id
    pub source_id: String,
    /// Formal citation (e.g. "Art. 1321 c.c.")
    pub citation: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub relevance: String,
}

/// Single step of an expert's reasoning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_number: usize,
    pub description: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Breakdown of an expert's confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub norm_clarity: f64,
    pub jurisprudence_alignment: f64,
    /// 1.0 = highly ambiguous
    pub contextual_ambiguity: f64,
    pub source_availability: f64,
}

impl Default for ConfidenceFactors {
    fn default() -> Self {
        Self {
            norm_clarity: 0.5,
            jurisprudence_alignment: 0.5,
            contextual_ambiguity: 0.5,
            source_availability: 0.5,
        }
    }
}

/// Immutable input context handed to every expert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertContext {
    pub query_text: String,
    #[serde(default)]
    pub query_embedding: Option<Vec<f32>>,
    /// Extracted entities keyed by kind ("norm_references", "legal_concepts")
    #[serde(default)]
    pub entities: HashMap<String, Vec<String>>,
    /// Chunks already retrieved before dispatch (optional seed material)
    #[serde(default)]
    pub retrieved_chunks: Vec<Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub trace_id: String,
}

impl ExpertContext {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            query_embedding: None,
            entities: HashMap::new(),
            retrieved_chunks: Vec::new(),
            metadata: HashMap::new(),
            trace_id: new_trace_id(),
        }
    }

    /// Normative references extracted from the query
    pub fn norm_references(&self) -> &[String] {
        self.entities
            .get("norm_references")
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Legal concepts extracted from the query
    pub fn legal_concepts(&self) -> &[String] {
        self.entities
            .get("legal_concepts")
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Timestamp-based trace id, unique to the microsecond
pub fn new_trace_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Structured output of a single expert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertResponse {
    pub expert_type: String,
    pub interpretation: String,
    #[serde(default)]
    pub legal_basis: Vec<LegalSource>,
    #[serde(default)]
    pub reasoning_steps: Vec<ReasoningStep>,
    pub confidence: f64,
    #[serde(default)]
    pub confidence_factors: ConfidenceFactors,
    #[serde(default)]
    pub limitations: String,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default = "now_iso")]
    pub timestamp: String,
    /// Additional metadata (e.g. react_metrics)
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

impl ExpertResponse {
    /// Degraded response used for timeouts, failures and missing services.
    pub fn degraded(
        expert_type: &str,
        interpretation: impl Into<String>,
        limitations: impl Into<String>,
        trace_id: &str,
    ) -> Self {
        Self {
            expert_type: expert_type.to_string(),
            interpretation: interpretation.into(),
            legal_basis: Vec::new(),
            reasoning_steps: Vec::new(),
            confidence: 0.0,
            confidence_factors: ConfidenceFactors::default(),
            limitations: limitations.into(),
            trace_id: trace_id.to_string(),
            execution_time_ms: 0.0,
            tokens_used: 0,
            timestamp: now_iso(),
            metadata: HashMap::new(),
        }
    }
}
