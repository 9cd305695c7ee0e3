//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lexgraph")]
#[command(about = "Multi-expert interpretation of Italian legal queries over a knowledge graph")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "terminal")]
    pub format: OutputFormat,

    /// Engine config file (defaults to the standard config path)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interpret a legal query through the multi-expert pipeline
    Query(QueryArgs),

    /// Show the routing decision for a query without running experts
    Route(RouteArgs),

    /// List the registered tool schemas
    Tools(ToolsArgs),
}

#[derive(Args)]
pub struct QueryArgs {
    /// The query text
    pub query: Vec<String>,

    /// Aggregation method
    #[arg(long, value_parser = ["weighted_average", "best_confidence", "consensus", "ensemble"])]
    pub method: Option<String>,

    /// Maximum number of experts to dispatch
    #[arg(long)]
    pub max_experts: Option<usize>,

    /// Per-expert timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Run experts one at a time instead of in parallel
    #[arg(long)]
    pub sequential: bool,

    /// Also run the no-retrieval baseline for comparison
    #[arg(long)]
    pub baseline: bool,

    /// Write the sealed trace document to this file
    #[arg(long)]
    pub trace_out: Option<PathBuf>,

    #[command(flatten)]
    pub backends: BackendArgs,
}

#[derive(Args)]
pub struct RouteArgs {
    /// The query text
    pub query: Vec<String>,
}

#[derive(Args)]
pub struct ToolsArgs {
    #[command(flatten)]
    pub backends: BackendArgs,
}

#[derive(Args)]
pub struct BackendArgs {
    /// Qdrant base URL
    #[arg(long, env = "LEXGRAPH_QDRANT_URL")]
    pub qdrant_url: Option<String>,

    /// Qdrant API key
    #[arg(long, env = "LEXGRAPH_QDRANT_API_KEY")]
    pub qdrant_api_key: Option<String>,

    /// Graph gateway base URL
    #[arg(long, env = "LEXGRAPH_GRAPH_URL")]
    pub graph_url: Option<String>,

    /// Graph name on the gateway
    #[arg(long, env = "LEXGRAPH_GRAPH_NAME", default_value = "legal_kg")]
    pub graph_name: String,

    /// Bridge store SQLite path
    #[arg(long, env = "LEXGRAPH_BRIDGE_PATH")]
    pub bridge_path: Option<PathBuf>,

    /// Normative archive base URL for article fetch
    #[arg(long, env = "LEXGRAPH_ARCHIVE_URL")]
    pub archive_url: Option<String>,

    /// Experts config YAML
    #[arg(long, env = "LEXGRAPH_EXPERTS_CONFIG")]
    pub experts_config: Option<PathBuf>,

    /// Router weights YAML
    #[arg(long, env = "LEXGRAPH_ROUTER_CONFIG")]
    pub router_config: Option<PathBuf>,

    /// Disable the LLM client even if configured
    #[arg(long)]
    pub no_llm: bool,
}
