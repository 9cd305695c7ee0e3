//! Hybrid retrieval
//!
//! Combines dense-vector similarity with graph-topology scoring:
//! `final_score = alpha * similarity + (1 - alpha) * graph_score`.

pub mod hybrid;
pub mod weights;

pub use hybrid::GraphAwareRetriever;
pub use weights::{for_expert, TraversalWeights};

use crate::config::RetrieverSettings;
use crate::error::{LexGraphError, Result};
use crate::model::{ChunkId, LinkedNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of hybrid retrieval for one chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: ChunkId,
    pub text: String,
    /// Cosine similarity from vector search [0, 1]
    pub similarity_score: f64,
    /// Score based on graph structure [0, 1]
    pub graph_score: f64,
    /// alpha * similarity + (1 - alpha) * graph
    pub final_score: f64,
    #[serde(default)]
    pub linked_nodes: Vec<LinkedNode>,
    #[serde(default)]
    pub metadata: Value,
}

impl RetrievalResult {
    /// article_urn from the chunk payload, if present
    pub fn article_urn(&self) -> Option<&str> {
        self.metadata.get("article_urn").and_then(Value::as_str)
    }

    /// source_type from the chunk payload, if present
    pub fn source_type(&self) -> Option<&str> {
        self.metadata.get("source_type").and_then(Value::as_str)
    }
}

/// Validated retriever configuration.
///
/// Construction fails on out-of-range values; a bad config aborts the query
/// invocation instead of degrading silently.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub alpha: f64,
    pub over_retrieve_factor: usize,
    pub max_graph_hops: usize,
    pub default_graph_score: f64,
    pub enable_graph_enrichment: bool,
    pub collection_name: String,
}

/// Bounds for the learnable alpha parameter
pub const ALPHA_MIN: f64 = 0.3;
pub const ALPHA_MAX: f64 = 0.9;

impl RetrieverConfig {
    pub fn from_settings(settings: &RetrieverSettings) -> Result<Self> {
        let config = Self {
            alpha: settings.alpha,
            over_retrieve_factor: settings.over_retrieve_factor,
            max_graph_hops: settings.max_graph_hops,
            default_graph_score: settings.default_graph_score,
            enable_graph_enrichment: settings.enable_graph_enrichment,
            collection_name: settings.collection.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(ALPHA_MIN..=ALPHA_MAX).contains(&self.alpha) {
            return Err(LexGraphError::Config(format!(
                "alpha must be in [{}, {}], got {}",
                ALPHA_MIN, ALPHA_MAX, self.alpha
            )));
        }
        if self.over_retrieve_factor < 1 {
            return Err(LexGraphError::Config(format!(
                "over_retrieve_factor must be >= 1, got {}",
                self.over_retrieve_factor
            )));
        }
        if !(1..=5).contains(&self.max_graph_hops) {
            return Err(LexGraphError::Config(format!(
                "max_graph_hops must be in [1, 5], got {}",
                self.max_graph_hops
            )));
        }
        if !(0.0..=1.0).contains(&self.default_graph_score) {
            return Err(LexGraphError::Config(format!(
                "default_graph_score must be in [0, 1], got {}",
                self.default_graph_score
            )));
        }
        Ok(())
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            over_retrieve_factor: 3,
            max_graph_hops: 3,
            default_graph_score: 0.5,
            enable_graph_enrichment: true,
            collection_name: "legal_chunks".to_string(),
        }
    }
}
