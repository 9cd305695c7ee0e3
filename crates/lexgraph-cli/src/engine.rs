//! Engine assembly: wires the configured backends into an orchestrator

use crate::app::BackendArgs;
use anyhow::Result;
use lexgraph_core::{
    ArticleFetchTool, BridgeStore, DefinitionLookupTool, EngineConfig, ExpertsFile,
    GraphAwareRetriever, GraphSearchTool, GraphStore, HierarchyNavigationTool, HttpGraphStore,
    HttpLlmClient, LanguageModel, Orchestrator, QdrantHttpStore, QueryRouter, RetrieverConfig,
    RouterWeightsFile, SemanticSearchTool, ToolRegistry, VectorStore, VerifySourcesTool,
};
use std::path::Path;
use std::sync::Arc;

pub struct Engine {
    pub orchestrator: Orchestrator,
    pub tools: Arc<ToolRegistry>,
}

/// Build the engine from the config file and backend arguments.
///
/// Every backend is optional: a missing vector store degrades retrieval to
/// empty results, a missing LLM degrades experts to source listings. The CLI
/// stays usable against whatever subset is actually reachable.
pub fn build_engine(config_path: Option<&Path>, backends: &BackendArgs) -> Result<Engine> {
    let config = match config_path {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    let llm: Option<Arc<HttpLlmClient>> = if backends.no_llm {
        None
    } else {
        Some(Arc::new(HttpLlmClient::new(config.llm.clone())?))
    };

    let vector_store: Option<Arc<dyn VectorStore>> = match backends.qdrant_url {
        Some(ref url) => Some(Arc::new(QdrantHttpStore::new(
            url.clone(),
            backends.qdrant_api_key.clone(),
        )?)),
        None => None,
    };

    let graph_store: Option<Arc<dyn GraphStore>> = match backends.graph_url {
        Some(ref url) => Some(Arc::new(HttpGraphStore::new(
            url.clone(),
            backends.graph_name.clone(),
        )?)),
        None => None,
    };

    let bridge = match backends.bridge_path {
        Some(ref path) => Some(Arc::new(BridgeStore::open(path)?)),
        None => None,
    };

    let retriever = Arc::new(GraphAwareRetriever::new(
        vector_store,
        graph_store.clone(),
        bridge.clone(),
        RetrieverConfig::from_settings(&config.retriever)?,
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(
        SemanticSearchTool::new(
            Some(retriever),
            llm.clone().map(|c| c as Arc<dyn lexgraph_core::Embedder>),
        ),
    ));
    registry.register(Arc::new(GraphSearchTool::new(graph_store.clone())));
    registry.register(Arc::new(DefinitionLookupTool::new(graph_store.clone())));
    registry.register(Arc::new(HierarchyNavigationTool::new(graph_store.clone())));
    registry.register(Arc::new(VerifySourcesTool::new(graph_store, bridge)));
    if let Some(ref archive_url) = backends.archive_url {
        registry.register(Arc::new(ArticleFetchTool::new(
            archive_url.clone(),
            config.llm.timeout_secs,
        )?));
    }
    let tools = Arc::new(registry);

    let experts_file = match backends.experts_config {
        Some(ref path) => ExpertsFile::load(path)?,
        None => ExpertsFile::default(),
    };

    let router = match backends.router_config {
        Some(ref path) => QueryRouter::with_config(&RouterWeightsFile::load(path)?),
        None => QueryRouter::new(),
    };

    let orchestrator = Orchestrator::new(
        tools.clone(),
        llm.map(|c| c as Arc<dyn LanguageModel>),
        &experts_file,
        router,
        config.orchestrator,
    );

    Ok(Engine {
        orchestrator,
        tools,
    })
}
