//! Memory trait: per-conversation message history.
//!
//! A store maps a [`ConversationId`] to the ordered messages of that
//! conversation. Callers load the whole sequence or replace it with a new
//! one. Implementations must make `replace` an
//! atomic swap so a concurrent `load` sees either the old or the new
//! sequence, never a half-written one. Per-key serialization of
//! read-modify-write cycles is the synchronizer's job, not the store's.

use crate::error::MemoryError;
use crate::message::{ConversationId, Message};
use async_trait::async_trait;

/// The core ChatMemoryStore trait.
///
/// Implementations: in-memory (default), none (no-op).
#[async_trait]
pub trait ChatMemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Load the stored sequence. Unknown ids yield an empty sequence.
    async fn load(&self, id: &ConversationId) -> std::result::Result<Vec<Message>, MemoryError>;

    /// Replace the stored sequence, creating the entry on first write.
    async fn replace(
        &self,
        id: &ConversationId,
        messages: Vec<Message>,
    ) -> std::result::Result<(), MemoryError>;

    /// Drop a conversation. Returns whether anything was stored.
    async fn delete(&self, id: &ConversationId) -> std::result::Result<bool, MemoryError>;

    /// Number of conversations currently stored.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}
