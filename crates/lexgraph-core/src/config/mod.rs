//! Configuration management

use crate::error::{LexGraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// LLM service configuration
    #[serde(default)]
    pub llm: LlmServiceConfig,

    /// Retriever tuning
    #[serde(default)]
    pub retriever: RetrieverSettings,

    /// Orchestrator behaviour
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmServiceConfig {
    /// Base URL of the LLM service for chat/completions
    pub url: String,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (auto-detected if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sampling temperature for completions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LlmServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LlmServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("LEXGRAPH_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("LEXGRAPH_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("LEXGRAPH_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            api_key: std::env::var("LEXGRAPH_LLM_API_KEY").ok(),
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("LEXGRAPH_LLM_MODEL")
        .unwrap_or_else(|_| "google/gemini-2.5-flash".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("LEXGRAPH_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "intfloat/multilingual-e5-large".to_string())
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout() -> u64 {
    30
}

/// Retriever tuning knobs, validated into a `RetrieverConfig` at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverSettings {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_over_retrieve")]
    pub over_retrieve_factor: usize,
    #[serde(default = "default_max_hops")]
    pub max_graph_hops: usize,
    #[serde(default = "default_graph_score")]
    pub default_graph_score: f64,
    #[serde(default = "default_true")]
    pub enable_graph_enrichment: bool,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            over_retrieve_factor: default_over_retrieve(),
            max_graph_hops: default_max_hops(),
            default_graph_score: default_graph_score(),
            enable_graph_enrichment: true,
            collection: default_collection(),
        }
    }
}

fn default_alpha() -> f64 {
    0.7
}
fn default_over_retrieve() -> usize {
    3
}
fn default_max_hops() -> usize {
    3
}
fn default_graph_score() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_collection() -> String {
    "legal_chunks".to_string()
}

/// Orchestrator behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_selection_threshold")]
    pub selection_threshold: f64,
    #[serde(default = "default_max_experts")]
    pub max_experts: usize,
    #[serde(default = "default_true")]
    pub parallel_execution: bool,
    #[serde(default = "default_aggregation")]
    pub aggregation_method: String,
    #[serde(default = "default_expert_timeout")]
    pub timeout_seconds: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            selection_threshold: default_selection_threshold(),
            max_experts: default_max_experts(),
            parallel_execution: true,
            aggregation_method: default_aggregation(),
            timeout_seconds: default_expert_timeout(),
        }
    }
}

fn default_selection_threshold() -> f64 {
    0.2
}
fn default_max_experts() -> usize {
    4
}
fn default_aggregation() -> String {
    "weighted_average".to_string()
}
fn default_expert_timeout() -> f64 {
    30.0
}

/// Per-expert overrides loaded from the experts YAML file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExpertSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub traversal_weights: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub use_react: Option<bool>,
    #[serde(default)]
    pub react_max_iterations: Option<usize>,
    #[serde(default)]
    pub react_novelty_threshold: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Defaults section of the experts file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExpertDefaults {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Experts configuration file: `{experts: {literal: {...}, ...}, defaults: {...}}`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExpertsFile {
    #[serde(default)]
    pub experts: HashMap<String, ExpertSettings>,
    #[serde(default)]
    pub defaults: ExpertDefaults,
}

impl ExpertsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Settings for one expert kind, empty if not configured
    pub fn settings_for(&self, expert_type: &str) -> ExpertSettings {
        self.experts.get(expert_type).cloned().unwrap_or_default()
    }
}

/// Router configuration file: `{gating: {query_type_weights: {...}}}`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterWeightsFile {
    #[serde(default)]
    pub gating: GatingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatingSection {
    #[serde(default)]
    pub query_type_weights: HashMap<String, HashMap<String, f64>>,
}

impl RouterWeightsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl EngineConfig {
    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LexGraphError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load config from the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
