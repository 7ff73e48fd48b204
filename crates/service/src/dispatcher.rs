//! Dispatcher: sends a finished sequence to the backend under the retry
//! policy and checks that what comes back is usable.

use promptline_core::error::{Error, Result};
use promptline_core::message::{Message, Role};
use promptline_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use promptline_providers::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Dispatcher {
    provider: Arc<dyn Provider>,
    model: String,
    retry: RetryPolicy,
    max_output_tokens: u32,
    temperature: Option<f32>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("retry", &self.retry)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl Dispatcher {
    /// Fails with a configuration error when `model` is blank.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(Error::config("model name must not be blank"));
        }
        Ok(Self {
            provider,
            model,
            retry: RetryPolicy::default(),
            max_output_tokens: 1024,
            temperature: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a raw request through the retry policy. The request's model and
    /// temperature are filled in from this dispatcher when unset.
    pub async fn send(&self, mut request: ProviderRequest) -> Result<ProviderResponse> {
        if request.model.trim().is_empty() {
            request.model = self.model.clone();
        }
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }

        debug!(
            provider = %self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            max_tokens = ?request.max_tokens,
            "Dispatching request"
        );

        let provider = &self.provider;
        let request = &request;
        self.retry
            .execute(move || provider.complete(request.clone()))
            .await
    }

    /// Send the final sequence and return the model's reply.
    ///
    /// `max_tokens` overrides the configured output budget for this call.
    pub async fn dispatch(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        max_tokens: Option<u32>,
    ) -> Result<ProviderResponse> {
        let request = ProviderRequest::new(self.model.clone(), messages)
            .with_tools(tools)
            .with_max_tokens(max_tokens.unwrap_or(self.max_output_tokens));

        let response = self.send(request).await?;

        if response.message.role() != Role::Assistant {
            return Err(Error::ContractViolation(format!(
                "expected an assistant reply, got a {} message",
                response.message.role()
            )));
        }

        info!(
            model = %response.model,
            prompt_tokens = response.usage.map(|u| u.prompt_tokens),
            completion_tokens = response.usage.map(|u| u.completion_tokens),
            stop_reason = ?response.stop_reason,
            "Reply received"
        );
        Ok(response)
    }
}
