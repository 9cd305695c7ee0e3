//! LLM trait definitions

use crate::error::Result;
use async_trait::async_trait;

/// Completion request for a language-model service
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Overrides the client's configured model when set
    pub model: Option<String>,
    pub temperature: f32,
    /// Ask the service for a JSON-object response
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            temperature: 0.3,
            json_response: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn expect_json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Completion response with token usage
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
    pub total_tokens: u64,
}

/// Language-model completion trait
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the request
    async fn generate(&self, request: CompletionRequest) -> Result<ModelResponse>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}
