//! In-memory store: the default conversation memory.

use async_trait::async_trait;
use promptline_core::error::MemoryError;
use promptline_core::memory::ChatMemoryStore;
use promptline_core::message::{ConversationId, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps each conversation as an immutable `Arc<Vec<Message>>`.
///
/// `replace` swaps the `Arc` under the write lock, so readers holding the
/// previous snapshot keep a complete sequence and never observe a partial
/// write.
pub struct InMemoryStore {
    entries: RwLock<HashMap<ConversationId, Arc<Vec<Message>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current snapshot without copying the messages.
    pub async fn snapshot(&self, id: &ConversationId) -> Option<Arc<Vec<Message>>> {
        self.entries.read().await.get(id).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatMemoryStore for InMemoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn load(&self, id: &ConversationId) -> Result<Vec<Message>, MemoryError> {
        let snapshot = self.snapshot(id).await;
        Ok(snapshot.map(|s| s.as_ref().clone()).unwrap_or_default())
    }

    async fn replace(&self, id: &ConversationId, messages: Vec<Message>) -> Result<(), MemoryError> {
        self.entries
            .write()
            .await
            .insert(id.clone(), Arc::new(messages));
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, MemoryError> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let store = InMemoryStore::new();
        let history = store.load(&ConversationId::from("missing")).await.unwrap();
        assert!(history.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_creates_entry_lazily() {
        let store = InMemoryStore::new();
        let id = ConversationId::from("c1");
        store
            .replace(&id, vec![Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();

        let history = store.load(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content(), "hello");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn old_snapshot_survives_replace() {
        let store = InMemoryStore::new();
        let id = ConversationId::from("c1");
        store.replace(&id, vec![Message::user("one")]).await.unwrap();

        let before = store.snapshot(&id).await.unwrap();
        store
            .replace(&id, vec![Message::user("one"), Message::user("two")])
            .await
            .unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_entry() {
        let store = InMemoryStore::new();
        let id = ConversationId::from("c1");
        store.replace(&id, vec![Message::user("bye")]).await.unwrap();
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
