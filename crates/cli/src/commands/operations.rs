//! `promptline operations`: List configured operations.

use super::load_config;
use promptline_config::OperationConfig;
use std::path::Path;

fn describe(op: &OperationConfig) -> String {
    let spec = &op.spec;
    let mut flags = Vec::new();
    if spec.add_to_memory {
        flags.push("memory");
    }
    if !spec.validate_order {
        flags.push("no-validate");
    }
    if spec.system_template.is_some() && spec.include_system_message {
        flags.push("system");
    }
    if spec.trailing_user_template.is_some() {
        flags.push("trailing-user");
    }
    if !spec.tools.is_empty() {
        flags.push("tools");
    }
    if flags.is_empty() {
        op.name.clone()
    } else {
        format!("{:<20} [{}]", op.name, flags.join(", "))
    }
}

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    println!("Model: {}", config.model);
    println!(
        "Retry: {} retries, {}ms initial backoff",
        config.retry.max_retries, config.retry.initial_backoff_ms
    );
    println!();

    if config.operations.is_empty() {
        println!("No operations configured.");
        return Ok(());
    }
    for op in &config.operations {
        println!("  {}", describe(op));
    }
    Ok(())
}
