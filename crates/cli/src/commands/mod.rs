pub mod count_tokens;
pub mod invoke;
pub mod operations;

use promptline_config::AppConfig;
use promptline_core::message::Message;
use promptline_providers::AnthropicProvider;
use promptline_service::AiService;
use std::path::Path;
use std::sync::Arc;

/// Load config from `path`, or the default location, with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => AppConfig::load_with_env(p),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build a service backed by the Anthropic transport.
pub fn build_service(config: &AppConfig) -> Result<AiService, Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PROMPTLINE_API_KEY   = 'sk-ant-...'");
        eprintln!("    ANTHROPIC_API_KEY    = 'sk-ant-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = AnthropicProvider::from_config(config)?;
    Ok(AiService::from_config(config, Arc::new(provider))?)
}

/// Read a JSON array of messages.
pub fn read_messages(path: &Path) -> Result<Vec<Message>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let messages = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid message JSON in {}: {e}", path.display()))?;
    Ok(messages)
}

/// Parse `name=value`.
pub fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("variable name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_var_splits_on_first_equals() {
        assert_eq!(
            parse_var("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn reads_message_array() {
        let messages = vec![Message::system("Be brief"), Message::user("Hi")];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&messages).unwrap()).unwrap();

        let read = read_messages(file.path()).unwrap();
        assert_eq!(read, messages);
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = AppConfig::default();
        assert!(build_service(&config).is_err());
    }
}
