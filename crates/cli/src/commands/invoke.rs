//! `promptline invoke`: Run one configured operation.

use super::{build_service, load_config, read_messages};
use promptline_core::message::Message;
use promptline_service::InvocationArgs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct InvokeRequest {
    pub operation: String,
    pub message: Option<String>,
    pub messages: Option<PathBuf>,
    pub vars: Vec<(String, String)>,
    pub conversation: Option<String>,
    pub dry_run: bool,
}

impl InvokeRequest {
    fn args(&self) -> Result<InvocationArgs, Box<dyn std::error::Error>> {
        let mut args = InvocationArgs::new();
        if let Some(path) = &self.messages {
            args = args.with_messages(read_messages(path)?);
        } else if let Some(text) = &self.message {
            args = args.with_messages(vec![Message::user(text.as_str())]);
        }
        for (name, value) in &self.vars {
            args = args.with_variable(name.as_str(), value.as_str());
        }
        if let Some(id) = &self.conversation {
            args = args.with_conversation_id(id.as_str());
        }
        Ok(args)
    }
}

pub async fn run(
    config_path: Option<&Path>,
    request: InvokeRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let service = build_service(&config)?;

    if service.operation(&request.operation).is_none() {
        let known = service.operation_names();
        let hint = if known.is_empty() {
            "no operations are configured; add [[operations]] to your config".to_string()
        } else {
            format!("known operations: {}", known.join(", "))
        };
        return Err(format!("Unknown operation '{}' ({hint})", request.operation).into());
    }

    let args = request.args()?;
    debug!(
        operation = %request.operation,
        dry_run = request.dry_run,
        variables = args.variables.len(),
        "CLI invoke"
    );

    if request.dry_run {
        let prepared = service.prepare(&request.operation, args).await?;
        println!("{}", serde_json::to_string_pretty(prepared.messages())?);
        return Ok(());
    }

    let response = service.invoke(&request.operation, args).await?;
    println!("{}", response.message.content());
    if let Some(usage) = response.usage {
        eprintln!(
            "  [{} | {} in / {} out]",
            response.model, usage.prompt_tokens, usage.completion_tokens
        );
    }
    Ok(())
}
