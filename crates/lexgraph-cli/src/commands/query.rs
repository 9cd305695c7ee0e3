//! Query command: full pipeline run

use crate::app::{OutputFormat, QueryArgs};
use crate::engine::build_engine;
use anyhow::{bail, Result};
use lexgraph_core::{AggregatedResponse, AggregationMethod, InterpretOptions};
use std::path::Path;
use std::time::Duration;

pub async fn run(args: QueryArgs, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    if query.trim().is_empty() {
        bail!("empty query");
    }

    let engine = build_engine(config, &args.backends)?;

    let opts = InterpretOptions {
        max_experts: args.max_experts,
        aggregation_method: args.method.as_deref().and_then(AggregationMethod::parse),
        timeout: args.timeout.map(Duration::from_secs_f64),
        sequential: args.sequential,
        run_baseline: args.baseline,
        ..Default::default()
    };

    let outcome = engine.orchestrator.interpret(&query, opts).await;

    if let Some(ref trace_path) = args.trace_out {
        std::fs::write(trace_path, serde_json::to_string_pretty(&outcome.trace)?)?;
        eprintln!("trace written to {}", trace_path.display());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome.response)?);
        }
        OutputFormat::Terminal => print_response(&outcome.response),
    }

    Ok(())
}

fn print_response(response: &AggregatedResponse) {
    println!("{}", response.synthesis);
    println!();
    println!(
        "confidenza: {:.2}  (metodo: {}, {} ms)",
        response.confidence, response.aggregation_method, response.execution_time_ms as u64
    );

    if !response.combined_legal_basis.is_empty() {
        println!("\nFonti:");
        for source in &response.combined_legal_basis {
            println!("  - {} [{}]", source.citation, source.source_id);
        }
    }

    if !response.conflicts.is_empty() {
        println!("\nConflitti:");
        for conflict in &response.conflicts {
            println!("  ! {}", conflict);
        }
    }

    let mut contributions: Vec<_> = response.expert_contributions.iter().collect();
    contributions.sort_by(|a, b| a.0.cmp(b.0));
    if !contributions.is_empty() {
        println!("\nContributi:");
        for (expert, contribution) in contributions {
            let confidence = contribution
                .get("confidence")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0);
            println!("  {} (confidenza {:.2})", expert, confidence);
        }
    }
}
