//! Invocation specifications.
//!
//! An [`InvocationSpec`] describes how one declared operation assembles its
//! outgoing messages. Specs are built once, registered under an operation
//! name, and reused for every call of that operation.

use crate::message::ConversationId;
use crate::provider::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Per-operation configuration for the invocation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSpec {
    /// Write the sent messages and the reply back to memory on success.
    #[serde(default)]
    pub add_to_memory: bool,

    /// Reject structurally invalid transcripts before dispatch.
    #[serde(default = "default_true")]
    pub validate_order: bool,

    /// Prepend the system template (when one is configured).
    #[serde(default = "default_true")]
    pub include_system_message: bool,

    /// Template for the leading system turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_template: Option<String>,

    /// Template for a user turn appended after everything else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_user_template: Option<String>,

    /// Conversation whose history backs this operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,

    /// Tool specifications forwarded with every dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Overrides the configured max output tokens for this operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for InvocationSpec {
    fn default() -> Self {
        Self {
            add_to_memory: false,
            validate_order: true,
            include_system_message: true,
            system_template: None,
            trailing_user_template: None,
            conversation_id: None,
            tools: Vec::new(),
            max_output_tokens: None,
        }
    }
}

impl InvocationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_add_to_memory(mut self, enabled: bool) -> Self {
        self.add_to_memory = enabled;
        self
    }

    pub fn with_validate_order(mut self, enabled: bool) -> Self {
        self.validate_order = enabled;
        self
    }

    pub fn with_include_system_message(mut self, enabled: bool) -> Self {
        self.include_system_message = enabled;
        self
    }

    pub fn with_system_template(mut self, template: impl Into<String>) -> Self {
        self.system_template = Some(template.into());
        self
    }

    pub fn with_trailing_user_template(mut self, template: impl Into<String>) -> Self {
        self.trailing_user_template = Some(template.into());
        self
    }

    pub fn with_conversation_id(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}
