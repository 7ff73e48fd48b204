//! Per-conversation access serialization.
//!
//! Every conversation id gets its own `tokio::sync::RwLock<()>` from a keyed
//! lock map. Reads share the lock; appends hold it exclusively for the whole
//! load → extend → replace cycle, so concurrent appends to one conversation
//! never lose updates. Ids never share a lock, so one busy conversation does
//! not stall another. An id's lock is dropped from the map once no caller
//! holds or waits on it, so the map only tracks conversations in use.

use promptline_core::error::MemoryError;
use promptline_core::memory::ChatMemoryStore;
use promptline_core::message::{ConversationId, Message};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

pub struct MemorySynchronizer {
    store: Arc<dyn ChatMemoryStore>,
    locks: Mutex<HashMap<ConversationId, Arc<RwLock<()>>>>,
}

impl MemorySynchronizer {
    pub fn new(store: Arc<dyn ChatMemoryStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn ChatMemoryStore> {
        &self.store
    }

    fn lock_for(&self, id: &ConversationId) -> Result<Lease<'_>, MemoryError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        let lock = locks.entry(id.clone()).or_default().clone();
        Ok(Lease {
            owner: self,
            id: id.clone(),
            lock,
        })
    }

    /// Remove the map entry for `id` if `lock` is its last outside holder.
    fn release(&self, id: &ConversationId, lock: &Arc<RwLock<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // Clones are only handed out under the map mutex, so the count is stable here.
        let idle = locks
            .get(id)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(id);
        }
    }

    /// Read the stored history; empty when the id is unknown.
    pub async fn read(&self, id: &ConversationId) -> Result<Vec<Message>, MemoryError> {
        let lease = self.lock_for(id)?;
        let _guard = lease.lock.read().await;
        self.store.load(id).await
    }

    /// Append `messages` to the stored history. Returns the new length.
    pub async fn append(
        &self,
        id: &ConversationId,
        messages: Vec<Message>,
    ) -> Result<usize, MemoryError> {
        let lease = self.lock_for(id)?;
        let _guard = lease.lock.write().await;

        let mut current = self.store.load(id).await?;
        let added = messages.len();
        current.extend(messages);
        let len = current.len();
        self.store.replace(id, current).await?;

        debug!(conversation_id = %id, added, len, "Memory: appended");
        Ok(len)
    }

    /// Forget a conversation entirely.
    pub async fn clear(&self, id: &ConversationId) -> Result<bool, MemoryError> {
        let lease = self.lock_for(id)?;
        let _guard = lease.lock.write().await;
        self.store.delete(id).await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// A handle on one conversation's lock. Dropping it (including when the
/// owning future is cancelled) prunes the map entry if nobody else uses it.
struct Lease<'a> {
    owner: &'a MemorySynchronizer,
    id: ConversationId,
    lock: Arc<RwLock<()>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.owner.release(&self.id, &self.lock);
    }
}
