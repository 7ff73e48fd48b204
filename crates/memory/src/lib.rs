//! Conversation memory for Promptline.
//!
//! Stores implement `promptline_core::ChatMemoryStore`; the
//! [`MemorySynchronizer`] layers per-conversation locking on top of any store.

pub mod in_memory;
pub mod noop;
pub mod synchronizer;

pub use in_memory::InMemoryStore;
pub use noop::NoopStore;
pub use synchronizer::MemorySynchronizer;
