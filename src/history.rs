//! Shared conversation history.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::ChatMessage;

/// Handle to a conversation history owned by the caller.
///
/// Cloning the handle does not copy the messages; every clone sees the same
/// storage. Interfaces keep the handle they were given.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Arc::new(RwLock::new(messages)),
        }
    }

    /// Whether two handles point at the same storage.
    pub fn ptr_eq(&self, other: &History) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }

    pub fn push(&self, message: ChatMessage) {
        self.write().push(message);
    }

    /// Copy of the current messages.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.read().clone()
    }

    pub fn last(&self) -> Option<ChatMessage> {
        self.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ChatMessage>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ChatMessage>> {
        self.messages.write().unwrap_or_else(PoisonError::into_inner)
    }
}
