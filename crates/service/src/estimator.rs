//! Token counting through zero-output probes.
//!
//! The backend is asked to process the target with `max_tokens = 0`; the
//! reported input usage is the estimate. Probes go through the same
//! dispatcher (and therefore the same retry policy) as real invocations.
//!
//! Tool specifications cannot be sent on their own, so they ride along with
//! a placeholder user turn whose configured cost is subtracted afterwards.
//! That subtraction is an approximation: the backend may tokenize the
//! placeholder differently next to tool definitions.

use crate::dispatcher::Dispatcher;
use promptline_config::EstimatorConfig;
use promptline_core::error::{Error, Result};
use promptline_core::message::{Message, ToolCall};
use promptline_core::provider::{ProviderRequest, ToolDefinition};
use std::sync::Arc;
use tracing::debug;

/// What to measure.
#[derive(Debug, Clone)]
pub enum EstimationTarget {
    Text(String),
    Message(Message),
    Messages(Vec<Message>),
    ToolExecutionRequests(Vec<ToolCall>),
    ToolSpecifications(Vec<ToolDefinition>),
}

#[derive(Debug, Clone)]
pub struct TokenCountEstimator {
    dispatcher: Arc<Dispatcher>,
    placeholder_text: String,
    placeholder_tokens: u32,
}

impl TokenCountEstimator {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self::from_config(dispatcher, &EstimatorConfig::default())
    }

    pub fn from_config(dispatcher: Arc<Dispatcher>, config: &EstimatorConfig) -> Self {
        Self {
            dispatcher,
            placeholder_text: config.placeholder_text.clone(),
            placeholder_tokens: config.placeholder_tokens,
        }
    }

    /// Replace the placeholder used for tool-specification probes.
    /// `tokens` must be the backend's cost for `text` alone.
    pub fn with_placeholder(mut self, text: impl Into<String>, tokens: u32) -> Self {
        self.placeholder_text = text.into();
        self.placeholder_tokens = tokens;
        self
    }

    pub async fn estimate(&self, target: EstimationTarget) -> Result<u32> {
        match target {
            EstimationTarget::Text(text) => self.estimate_text(text).await,
            EstimationTarget::Message(message) => self.estimate_message(message).await,
            EstimationTarget::Messages(messages) => self.estimate_messages(messages).await,
            EstimationTarget::ToolExecutionRequests(calls) => {
                self.estimate_tool_execution_requests(calls).await
            }
            EstimationTarget::ToolSpecifications(tools) => {
                self.estimate_tool_specifications(tools).await
            }
        }
    }

    /// Measured as a single user message.
    pub async fn estimate_text(&self, text: impl Into<String>) -> Result<u32> {
        self.estimate_message(Message::user(text)).await
    }

    pub async fn estimate_message(&self, message: Message) -> Result<u32> {
        self.estimate_messages(vec![message]).await
    }

    pub async fn estimate_messages(&self, messages: Vec<Message>) -> Result<u32> {
        self.probe(messages, Vec::new()).await
    }

    /// Measured as one assistant message carrying the calls.
    pub async fn estimate_tool_execution_requests(&self, calls: Vec<ToolCall>) -> Result<u32> {
        self.estimate_message(Message::assistant_tool_calls(calls))
            .await
    }

    /// Cost of the specifications alone, never below zero.
    pub async fn estimate_tool_specifications(&self, tools: Vec<ToolDefinition>) -> Result<u32> {
        let combined = self
            .probe(vec![Message::user(self.placeholder_text.clone())], tools)
            .await?;
        Ok(combined.saturating_sub(self.placeholder_tokens))
    }

    async fn probe(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Result<u32> {
        let request = ProviderRequest::new(self.dispatcher.model(), messages)
            .with_tools(tools)
            .with_max_tokens(0);

        let response = self.dispatcher.send(request).await?;
        let usage = response.usage.ok_or_else(|| {
            Error::ContractViolation("token count probe returned no usage".into())
        })?;

        debug!(
            model = %response.model,
            input_tokens = usage.prompt_tokens,
            "Token count probe"
        );
        Ok(usage.prompt_tokens)
    }
}
