//! No-op memory store: remembers nothing.

use async_trait::async_trait;
use promptline_core::error::MemoryError;
use promptline_core::memory::ChatMemoryStore;
use promptline_core::message::{ConversationId, Message};

/// A store that drops every write and always loads an empty history.
pub struct NoopStore;

#[async_trait]
impl ChatMemoryStore for NoopStore {
    fn name(&self) -> &str { "none" }

    async fn load(&self, _id: &ConversationId) -> Result<Vec<Message>, MemoryError> {
        Ok(Vec::new())
    }

    async fn replace(&self, _id: &ConversationId, _messages: Vec<Message>) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn delete(&self, _id: &ConversationId) -> Result<bool, MemoryError> {
        Ok(false)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(0)
    }
}
