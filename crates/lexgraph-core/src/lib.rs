//! Lexgraph Core Library
//!
//! Hybrid graph-aware retrieval and multi-expert interpretation of Italian
//! legal sources.
//!
//! # Features
//! - Hybrid retrieval blending vector similarity with graph-topology scoring
//! - Four interpretive experts (literal, systemic, principles, precedent)
//!   routed by query type and run under bounded concurrency
//! - ReAct tool-calling loop with novelty-based convergence
//! - Four aggregation policies with conflict detection
//! - Per-query trace with source grounding validation

pub mod config;
pub mod error;
pub mod experts;
pub mod llm;
pub mod model;
pub mod retrieval;
pub mod storage;
pub mod tools;
pub mod trace;

pub use config::{
    EngineConfig, ExpertDefaults, ExpertSettings, ExpertsFile, LlmServiceConfig,
    OrchestratorSettings, RetrieverSettings, RouterWeightsFile,
};
pub use error::{Error, LexGraphError, Result};
pub use experts::{
    AggregatedResponse, AggregationMethod, Expert, GatingNetwork, InterpretOptions, Orchestrator,
    OrchestratorOutcome, QueryRouter, QueryType, ReactConfig, ReactController, ReactOutcome,
    RoutingDecision,
};
pub use llm::{
    CompletionRequest, Embedder, HttpLlmClient, LanguageModel, MetricsSnapshot, ModelResponse,
};
pub use model::{
    ChunkId, ConfidenceFactors, ExpertContext, ExpertKind, ExpertResponse, LegalSource,
    LinkedNode, NodeUrn, ReasoningStep, SourceType,
};
pub use retrieval::{GraphAwareRetriever, RetrievalResult, RetrieverConfig, TraversalWeights};
pub use storage::{
    BridgeMapping, BridgeStore, GraphStore, HttpGraphStore, MappingType, PointId, QdrantHttpStore,
    ScoredPoint, VectorStore,
};
pub use tools::{
    ArticleFetchTool, DefinitionLookupTool, GraphSearchTool, HierarchyNavigationTool,
    ParameterKind, SemanticSearchTool, Tool, ToolArgs, ToolParameter, ToolRegistry, ToolResult,
    VerifySourcesTool,
};
pub use trace::{ConfigSnapshot, SourceValidation, TraceCollector, TraceDocument};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "lexgraph";
