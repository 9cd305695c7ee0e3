//! Route command: show the routing decision without dispatching experts

use crate::app::{OutputFormat, RouteArgs};
use anyhow::{bail, Result};
use lexgraph_core::{ExpertContext, ExpertKind, QueryRouter};

pub fn run(args: RouteArgs, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    if query.trim().is_empty() {
        bail!("empty query");
    }

    let decision = QueryRouter::new().route(&ExpertContext::new(&query));

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        OutputFormat::Terminal => {
            println!(
                "tipo query: {} (confidenza {:.2})",
                decision.query_type.as_str(),
                decision.confidence
            );
            println!("{}", decision.reasoning);
            println!("\nPesi expert:");
            for kind in ExpertKind::ALL {
                let weight = decision.expert_weights.get(&kind).copied().unwrap_or(0.0);
                println!("  {:<10} {:.3}", kind.as_str(), weight);
            }
        }
    }

    Ok(())
}
