//! # Promptline Core
//!
//! Domain types, traits, and error definitions for the Promptline invocation
//! pipeline. Every collaborator the pipeline talks to (the model backend and
//! the conversation memory) is defined as a trait here; implementations live
//! in their own crates so they can be swapped or mocked in tests.

pub mod error;
pub mod invocation;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result};
pub use invocation::InvocationSpec;
pub use memory::ChatMemoryStore;
pub use message::{ContentPart, ConversationId, Message, Role, ToolCall};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, StopReason, ToolDefinition, Usage,
};
