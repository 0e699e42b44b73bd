use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Message, NewMessage, NewThread, Thread, ThreadUpdate};
use crate::error::Result;

/// Durable keyed storage for threads and their parent-linked messages.
///
/// Implementations must hide soft-deleted threads from every read: such a
/// thread is reported as missing, and so are its messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a new thread
    async fn create_thread(&self, new: NewThread) -> Result<Thread>;

    /// Get a live thread by ID
    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>>;

    /// List live threads, most recently updated first
    async fn list_threads(&self, limit: Option<usize>) -> Result<Vec<Thread>>;

    /// Rename a thread or change its persona
    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<Thread>;

    /// Bump `updated_at`
    async fn touch_thread(&self, thread_id: &str) -> Result<()>;

    /// Set the soft-delete marker
    async fn soft_delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Create a message. The thread must be live and the parent, when given,
    /// must be a live message of the same thread.
    async fn create_message(&self, new: NewMessage) -> Result<Message>;

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>>;

    /// All messages of a thread in creation order
    async fn get_messages_by_thread(&self, thread_id: &str) -> Result<Vec<Message>>;

    /// Direct children of a message in creation order
    async fn get_children(&self, message_id: &str) -> Result<Vec<Message>>;

    async fn set_context_flag(&self, message_id: &str, is_context: bool) -> Result<Message>;

    /// Apply a batch of content updates and deletions all-or-nothing.
    ///
    /// Fails with `MessageNotFound` when an update targets a missing message
    /// and with `Conflict` when a deletion would orphan a surviving child.
    /// Deleting ids that are already gone is not an error. Returns the
    /// number of messages actually deleted.
    async fn commit(&self, batch: WriteBatch) -> Result<usize>;

    async fn update_message_content(&self, message_id: &str, content: &str) -> Result<()> {
        self.commit(WriteBatch::new().update(message_id, content))
            .await
            .map(|_| ())
    }

    async fn delete_messages(&self, message_ids: &[String]) -> Result<usize> {
        self.commit(WriteBatch::new().delete_all(message_ids.iter().cloned()))
            .await
    }
}

/// A set of message writes that commit together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub updates: Vec<ContentUpdate>,
    pub deletes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUpdate {
    pub message_id: String,
    pub content: String,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(mut self, message_id: impl Into<String>, content: impl Into<String>) -> Self {
        self.updates.push(ContentUpdate {
            message_id: message_id.into(),
            content: content.into(),
        });
        self
    }

    pub fn delete(mut self, message_id: impl Into<String>) -> Self {
        self.deletes.push(message_id.into());
        self
    }

    pub fn delete_all(mut self, message_ids: impl IntoIterator<Item = String>) -> Self {
        self.deletes.extend(message_ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }
}
