//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Image content blocks (URL and base64 sources)
//! - `max_tokens = 0` probes that only report input usage

use async_trait::async_trait;
use promptline_config::AppConfig;
use promptline_core::error::ProviderError;
use promptline_core::message::{ContentPart, Message, Role, ToolCall};
use promptline_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    api_version: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a new Anthropic provider. Fails on a blank key.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("Anthropic API key is blank".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key,
            api_version: DEFAULT_ANTHROPIC_VERSION.into(),
            client,
        })
    }

    /// Build from application config. Missing key is a setup-time error.
    pub fn from_config(config: &AppConfig) -> promptline_core::Result<Self> {
        config.validate_for_dispatch()?;
        let api_key = config.api_key.clone().unwrap_or_default();
        let provider = Self::new(api_key, Duration::from_secs(config.provider.timeout_secs))
            .map_err(|e| promptline_core::Error::config(e.to_string()))?
            .with_base_url(&config.provider.base_url)
            .with_api_version(&config.provider.api_version);
        Ok(provider)
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Split system messages out of the sequence.
    /// Anthropic puts system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role() {
                Role::System => system_parts.push(msg.content()),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    fn image_block(part: &ContentPart) -> ContentBlock {
        let source = match part {
            ContentPart::ImageUrl { url } => ImageSource::Url { url: url.clone() },
            ContentPart::ImageBase64 { media_type, data } => ImageSource::Base64 {
                media_type: media_type.clone(),
                data: data.clone(),
            },
        };
        ContentBlock::Image { source }
    }

    /// Convert messages to Anthropic API format with content blocks.
    ///
    /// Consecutive tool results are folded into one user turn, which is how
    /// the Messages API expects parallel tool results.
    fn to_api_messages(messages: &[&Message]) -> Result<Vec<AnthropicMessage>, ProviderError> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role() {
                Role::User => {
                    let content = if msg.parts().is_empty() {
                        AnthropicContent::Text(msg.content().to_string())
                    } else {
                        let mut blocks: Vec<ContentBlock> =
                            msg.parts().iter().map(Self::image_block).collect();
                        if !msg.content().is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content().to_string(),
                            });
                        }
                        AnthropicContent::Blocks(blocks)
                    };
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content,
                    });
                }
                Role::Assistant => {
                    if !msg.has_tool_calls() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.content().to_string()),
                        });
                        continue;
                    }

                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if !msg.content().is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content().to_string(),
                        });
                    }
                    for tc in msg.tool_calls() {
                        let input = Self::tool_input(tc)?;
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::ToolResult => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id().unwrap_or_default().to_string(),
                        content: msg.content().to_string(),
                    };
                    let joins_previous = matches!(
                        result.last(),
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user"
                            && blocks
                                .iter()
                                .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
                    );
                    if joins_previous {
                        if let Some(AnthropicMessage {
                            content: AnthropicContent::Blocks(blocks),
                            ..
                        }) = result.last_mut()
                        {
                            blocks.push(block);
                        }
                    } else {
                        result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        });
                    }
                }
                Role::System => {} // handled separately
            }
        }

        Ok(result)
    }

    /// Parse a tool call's JSON arguments into a `tool_use` input object.
    /// Blank arguments mean a call without parameters.
    fn tool_input(tc: &ToolCall) -> Result<serde_json::Value, ProviderError> {
        if tc.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        match serde_json::from_str::<serde_json::Value>(&tc.arguments) {
            Ok(input) if input.is_object() => Ok(input),
            Ok(other) => Err(ProviderError::InvalidRequest(format!(
                "arguments of tool call '{}' ({}) must be a JSON object, got: {other}",
                tc.name, tc.id
            ))),
            Err(e) => Err(ProviderError::InvalidRequest(format!(
                "arguments of tool call '{}' ({}) are not valid JSON: {e}",
                tc.name, tc.id
            ))),
        }
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages)?;

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        Ok(body)
    }

    /// Map a non-200 status to a classified error.
    fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
        match status {
            400 | 413 | 422 => ProviderError::InvalidRequest(body),
            401 | 403 => ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()),
            404 => ProviderError::ModelNotFound(body),
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(5),
            },
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl promptline_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request)?;

        debug!(
            provider = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::classify_status(status, retry_after, error_body));
        }

        let api_resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(Self::response_to_provider_response(api_resp))
    }
}

impl AnthropicProvider {
    /// Convert Anthropic API response to our ProviderResponse.
    ///
    /// Usage is left as `None` when the backend omits input tokens; callers
    /// that need it treat that as a contract violation.
    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    });
                }
                ResponseContentBlock::Other => {}
            }
        }

        let message = Message::assistant(text_content)
            .with_tool_calls(tool_calls)
            .with_id(resp.id.clone());

        let usage = resp.usage.and_then(|u| {
            u.input_tokens
                .map(|input| Usage::new(input, u.output_tokens.unwrap_or(0)))
        });

        ProviderResponse {
            message,
            usage,
            stop_reason: resp.stop_reason.as_deref().map(StopReason::parse),
            model: resp.model,
        }
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImageSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    #[serde(default)]
    content: Vec<ResponseContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}
