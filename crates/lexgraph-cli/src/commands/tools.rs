//! Tools command: list registered tool schemas

use crate::app::{OutputFormat, ToolsArgs};
use crate::engine::build_engine;
use anyhow::Result;
use std::path::Path;

pub fn run(args: ToolsArgs, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let engine = build_engine(config, &args.backends)?;
    let schemas = engine.tools.schema_of_all();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        OutputFormat::Terminal => {
            for schema in &schemas {
                let name = schema["name"].as_str().unwrap_or("?");
                let description = schema["description"].as_str().unwrap_or("");
                println!("{:<22} {}", name, description);
            }
        }
    }

    Ok(())
}
