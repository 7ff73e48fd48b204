//! `promptline count-tokens`: Estimate input tokens via a zero-output probe.

use super::{build_service, load_config, read_messages};
use promptline_core::provider::ToolDefinition;
use promptline_service::EstimationTarget;
use std::path::{Path, PathBuf};

fn target(
    text: Option<String>,
    messages: Option<PathBuf>,
    tools: Option<PathBuf>,
) -> Result<EstimationTarget, Box<dyn std::error::Error>> {
    if let Some(path) = messages {
        return Ok(EstimationTarget::Messages(read_messages(&path)?));
    }
    if let Some(path) = tools {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        let tools: Vec<ToolDefinition> = serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid tool JSON in {}: {e}", path.display()))?;
        return Ok(EstimationTarget::ToolSpecifications(tools));
    }
    match text {
        Some(text) => Ok(EstimationTarget::Text(text)),
        None => Err("Nothing to measure: pass --text, --messages or --tools".into()),
    }
}

pub async fn run(
    config_path: Option<&Path>,
    text: Option<String>,
    messages: Option<PathBuf>,
    tools: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = target(text, messages, tools)?;
    let config = load_config(config_path)?;
    let service = build_service(&config)?;

    let count = service.token_estimator().estimate(target).await?;
    println!("{count}");
    Ok(())
}
