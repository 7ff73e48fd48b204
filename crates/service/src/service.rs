//! The invocation pipeline.
//!
//! Operations are registered once under a name. Each call then runs:
//!
//! ```text
//! resolve templates → read history → assemble → validate → dispatch → write back
//! ```
//!
//! Validation failures stop the call before any backend traffic. Memory is
//! written only after the backend replied successfully.

use crate::dispatcher::Dispatcher;
use crate::estimator::TokenCountEstimator;
use crate::sequence::{self, AssembledSequence, SequenceInput};
use crate::template::{PromptTemplate, TemplateResolver};
use crate::validator;
use promptline_config::{AppConfig, EstimatorConfig};
use promptline_core::error::{Error, Result};
use promptline_core::invocation::InvocationSpec;
use promptline_core::message::{ConversationId, Message};
use promptline_core::provider::{Provider, ProviderResponse};
use promptline_memory::{InMemoryStore, MemorySynchronizer};
use promptline_providers::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Conversation used for write-back when neither the call nor the operation
/// names one.
pub const DEFAULT_CONVERSATION: &str = "default";

/// Per-call arguments.
#[derive(Debug, Clone, Default)]
pub struct InvocationArgs {
    /// Caller-supplied messages. `None` lets stored history stand in.
    pub messages: Option<Vec<Message>>,
    /// Values for template variables.
    pub variables: HashMap<String, String>,
    /// Overrides the operation's conversation id.
    pub conversation_id: Option<ConversationId>,
}

impl InvocationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(ConversationId(id.into()));
        self
    }
}

/// A validated sequence ready to dispatch.
#[derive(Debug, Clone)]
pub struct PreparedInvocation {
    pub spec: Arc<InvocationSpec>,
    pub sequence: AssembledSequence,
    pub conversation_id: Option<ConversationId>,
}

impl PreparedInvocation {
    pub fn messages(&self) -> &[Message] {
        &self.sequence.messages
    }
}

pub struct AiService {
    dispatcher: Arc<Dispatcher>,
    memory: Arc<MemorySynchronizer>,
    templates: Arc<dyn TemplateResolver>,
    estimator: EstimatorConfig,
    operations: HashMap<String, Arc<InvocationSpec>>,
}

impl AiService {
    /// A service with in-process memory and `{{variable}}` templates.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            memory: Arc::new(MemorySynchronizer::new(Arc::new(InMemoryStore::new()))),
            templates: Arc::new(PromptTemplate),
            estimator: EstimatorConfig::default(),
            operations: HashMap::new(),
        }
    }

    /// Build a service from configuration and register every declared
    /// operation.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Result<Self> {
        config.validate()?;

        let dispatcher = Dispatcher::new(provider, config.model.clone())?
            .with_retry(RetryPolicy::from_config(&config.retry))
            .with_max_output_tokens(config.max_output_tokens)
            .with_temperature(config.temperature);

        let mut service = Self::new(dispatcher).with_estimator_config(config.estimator.clone());
        for op in &config.operations {
            service.register(op.name.clone(), op.spec.clone())?;
        }
        Ok(service)
    }

    pub fn with_memory(mut self, memory: Arc<MemorySynchronizer>) -> Self {
        self.memory = memory;
        self
    }

    /// Swap the template engine. Call before registering operations; specs
    /// already registered were checked against the previous engine.
    pub fn with_template_resolver(mut self, templates: Arc<dyn TemplateResolver>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_estimator_config(mut self, config: EstimatorConfig) -> Self {
        self.estimator = config;
        self
    }

    pub fn memory(&self) -> &Arc<MemorySynchronizer> {
        &self.memory
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// A token estimator sharing this service's backend and retry policy.
    pub fn token_estimator(&self) -> TokenCountEstimator {
        TokenCountEstimator::from_config(self.dispatcher.clone(), &self.estimator)
    }

    /// Register `spec` under `name`. Names must be unique and non-blank and
    /// templates must parse.
    pub fn register(&mut self, name: impl Into<String>, spec: InvocationSpec) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::config("operation name must not be blank"));
        }
        if self.operations.contains_key(&name) {
            return Err(Error::config(format!(
                "operation '{name}' is already registered"
            )));
        }
        for template in [&spec.system_template, &spec.trailing_user_template]
            .into_iter()
            .flatten()
        {
            self.templates.check(template).map_err(|e| {
                Error::config(format!("operation '{name}' has an invalid template: {e}"))
            })?;
        }

        debug!(operation = %name, "Registered operation");
        self.operations.insert(name, Arc::new(spec));
        Ok(())
    }

    pub fn operation(&self, name: &str) -> Option<&Arc<InvocationSpec>> {
        self.operations.get(name)
    }

    /// Registered operation names, sorted.
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Everything short of dispatch: templates, history, assembly and
    /// validation.
    pub async fn prepare(&self, name: &str, args: InvocationArgs) -> Result<PreparedInvocation> {
        let spec = self
            .operations
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("unknown operation '{name}'")))?;

        let InvocationArgs {
            messages,
            variables,
            conversation_id,
        } = args;
        let conversation_id = conversation_id.or_else(|| spec.conversation_id.clone());

        let system_text = match &spec.system_template {
            Some(t) if spec.include_system_message => {
                Some(self.templates.resolve(t, &variables)?)
            }
            _ => None,
        };
        let trailing_user_text = spec
            .trailing_user_template
            .as_deref()
            .map(|t| self.templates.resolve(t, &variables))
            .transpose()?;

        let history = match (&messages, &conversation_id) {
            (None, Some(id)) => self.memory.read(id).await?,
            _ => Vec::new(),
        };

        let sequence = sequence::assemble(
            &spec,
            SequenceInput {
                system_text,
                history,
                dynamic: messages,
                trailing_user_text,
            },
        );

        if spec.validate_order {
            validator::validate(&sequence.messages)?;
        }

        Ok(PreparedInvocation {
            spec,
            sequence,
            conversation_id,
        })
    }

    /// Run operation `name` end to end and return the backend's reply.
    pub async fn invoke(&self, name: &str, args: InvocationArgs) -> Result<ProviderResponse> {
        let prepared = match self.prepare(name, args).await {
            Ok(p) => p,
            Err(e) => {
                warn!(operation = %name, error = %e, "Invocation rejected");
                return Err(e);
            }
        };
        let PreparedInvocation {
            spec,
            sequence,
            conversation_id,
        } = prepared;

        info!(
            operation = %name,
            messages = sequence.messages.len(),
            history = sequence.history_len(),
            conversation_id = conversation_id.as_ref().map(ConversationId::as_str),
            "Invoking"
        );

        let fresh = spec.add_to_memory.then(|| sequence.fresh_messages());
        let response = self
            .dispatcher
            .dispatch(sequence.messages, spec.tools.clone(), spec.max_output_tokens)
            .await?;

        if let Some(mut fresh) = fresh {
            let id = conversation_id.unwrap_or_else(|| ConversationId::from(DEFAULT_CONVERSATION));
            fresh.push(response.message.clone());
            self.memory.append(&id, fresh).await.map_err(|e| {
                warn!(operation = %name, conversation_id = %id, error = %e, "Memory write-back failed");
                Error::Memory(e)
            })?;
        }

        Ok(response)
    }
}
