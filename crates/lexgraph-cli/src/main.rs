//! Lexgraph CLI
//!
//! Multi-expert interpretation of Italian legal queries over a knowledge
//! graph of norms, jurisprudence and doctrine.

use anyhow::Result;
use clap::Parser;

mod app;
mod commands;
mod engine;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Query(args) => commands::query::run(args, config, cli.format).await,
        Commands::Route(args) => commands::route::run(args, cli.format),
        Commands::Tools(args) => commands::tools::run(args, config, cli.format),
    }
}
