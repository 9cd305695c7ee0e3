//! Language-model services
//!
//! Provides:
//! - `LanguageModel` / `Embedder` traits used across experts and tools
//! - `HttpLlmClient` for OpenAI-compatible services (OpenRouter, vLLM)
//! - Response parsing helpers (fence stripping, JSON extraction)

mod client;
mod parse;
mod traits;

pub use client::{ApiMetrics, HttpLlmClient, MetricsSnapshot};
pub use parse::{extract_json_object, strip_code_fences};
pub use traits::{CompletionRequest, Embedder, LanguageModel, ModelResponse};
