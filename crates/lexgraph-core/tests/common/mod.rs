//! Shared fakes for integration tests: frozen vector/graph backends and a
//! scripted language model.

#![allow(dead_code)]

use async_trait::async_trait;
use lexgraph_core::{
    CompletionRequest, Embedder, LanguageModel, ModelResponse, PointId, Result, ScoredPoint,
    VectorStore,
};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Embedder returning a constant vector
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.1; 8])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.1; 8]).collect())
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn model_name(&self) -> &str {
        "fixed-embedder"
    }
}

/// Vector store replaying a frozen point set
pub struct CannedVectors(pub Vec<ScoredPoint>);

#[async_trait]
impl VectorStore for CannedVectors {
    async fn query_points(
        &self,
        _collection: &str,
        _query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

/// Build a norm chunk point with a stable id
pub fn norm_point(id: Uuid, score: f64, text: &str, article_urn: &str) -> ScoredPoint {
    ScoredPoint {
        id: PointId::Uuid(id),
        score,
        payload: json!({
            "text": text,
            "article_urn": article_urn,
            "source_type": "norma",
        }),
    }
}

/// Language model answering by the first rule whose marker appears in the
/// prompt. Deterministic: identical prompts always get identical answers.
pub struct MarkerLlm {
    rules: Vec<(String, String)>,
    default: String,
    /// Prompts containing this marker hang past any reasonable deadline
    hang_marker: Option<String>,
}

impl MarkerLlm {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: default.into(),
            hang_marker: None,
        }
    }

    pub fn with_rule(mut self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((marker.into(), response.into()));
        self
    }

    pub fn hang_on(mut self, marker: impl Into<String>) -> Self {
        self.hang_marker = Some(marker.into());
        self
    }
}

#[async_trait]
impl LanguageModel for MarkerLlm {
    async fn generate(&self, request: CompletionRequest) -> Result<ModelResponse> {
        if let Some(ref marker) = self.hang_marker {
            if request.prompt.contains(marker) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }

        let content = self
            .rules
            .iter()
            .find(|(marker, _)| request.prompt.contains(marker))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default.clone());

        Ok(ModelResponse {
            content,
            total_tokens: 42,
        })
    }

    fn model_name(&self) -> &str {
        "marker-llm"
    }
}

/// Minimal valid expert JSON with no citations
pub fn empty_expert_json(confidence: f64) -> String {
    json!({
        "interpretation": "Nessuna fonte specifica disponibile.",
        "legal_basis": [],
        "reasoning_steps": [],
        "confidence": confidence,
        "limitations": "fonti limitate",
    })
    .to_string()
}

/// Expert JSON citing the given (source_id, citation) pairs as norms
pub fn citing_expert_json(confidence: f64, sources: &[(&str, &str)]) -> String {
    let basis: Vec<Value> = sources
        .iter()
        .map(|(id, citation)| {
            json!({
                "source_type": "norm",
                "source_id": id,
                "citation": citation,
                "excerpt": "testo della norma",
                "relevance": "fonte principale",
            })
        })
        .collect();

    json!({
        "interpretation": "Interpretazione fondata sulle fonti recuperate.",
        "legal_basis": basis,
        "reasoning_steps": [
            {"step_number": 1, "description": "Analisi del testo", "sources": [sources[0].0]}
        ],
        "confidence": confidence,
        "limitations": "",
    })
    .to_string()
}
