//! Promptline CLI: the main entry point.
//!
//! Commands:
//! - `invoke`       : Run a configured operation against the model
//! - `count-tokens` : Estimate input tokens with a zero-output probe
//! - `operations`   : List configured operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "promptline",
    about = "Promptline: validated, memory-aware LLM invocation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.promptline/config.toml)
    #[arg(short, long, global = true, env = "PROMPTLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a configured operation
    Invoke {
        /// Operation name from [[operations]]
        operation: String,

        /// Send this text as a user message
        #[arg(short, long, conflicts_with = "messages")]
        message: Option<String>,

        /// JSON file holding the message array to send
        #[arg(long)]
        messages: Option<PathBuf>,

        /// Template variable as name=value (repeatable)
        #[arg(long = "var", value_parser = commands::parse_var)]
        vars: Vec<(String, String)>,

        /// Conversation id for history and write-back
        #[arg(long)]
        conversation: Option<String>,

        /// Print the validated sequence instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Estimate the input token count of text, messages or tools
    CountTokens {
        /// Plain text to measure
        #[arg(short, long, conflicts_with_all = ["messages", "tools"])]
        text: Option<String>,

        /// JSON file holding a message array
        #[arg(long, conflicts_with = "tools")]
        messages: Option<PathBuf>,

        /// JSON file holding an array of tool definitions
        #[arg(long)]
        tools: Option<PathBuf>,
    },

    /// List configured operations
    Operations,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Invoke {
            operation,
            message,
            messages,
            vars,
            conversation,
            dry_run,
        } => {
            let request = commands::invoke::InvokeRequest {
                operation,
                message,
                messages,
                vars,
                conversation,
                dry_run,
            };
            commands::invoke::run(config_path, request).await?
        }
        Commands::CountTokens {
            text,
            messages,
            tools,
        } => commands::count_tokens::run(config_path, text, messages, tools).await?,
        Commands::Operations => commands::operations::run(config_path).await?,
    }

    Ok(())
}
