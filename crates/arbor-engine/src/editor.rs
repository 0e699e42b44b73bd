use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use arbor_persist::{Message, MessageRole, MessageStore, NewMessage, WriteBatch};
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Result of editing a user message.
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub message: Message,
    pub deleted_descendant_count: usize,
}

/// Structural mutations of a conversation tree.
///
/// Every multi-step change (edit plus cascade, delete plus subtree) is
/// submitted as one [`WriteBatch`], so the store applies it completely or
/// not at all.
#[derive(Clone)]
pub struct CascadeEditor {
    store: Arc<dyn MessageStore>,
}

impl CascadeEditor {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    async fn require(&self, message_id: &str) -> Result<Message> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| EngineError::MessageNotFound(message_id.to_string()))
    }

    fn require_user(message: &Message) -> Result<()> {
        if message.role != MessageRole::User {
            return Err(EngineError::InvalidRole {
                message_id: message.id.clone(),
                role: message.role,
            });
        }
        Ok(())
    }

    pub async fn add_message(&self, new: NewMessage) -> Result<Message> {
        let message = self.store.create_message(new).await?;
        tracing::info!(
            thread_id = %message.thread_id,
            message_id = %message.id,
            role = %message.role,
            "Message added"
        );
        Ok(message)
    }

    /// Replace the content of a user message without touching its replies.
    pub async fn update_message(&self, message_id: &str, content: &str) -> Result<Message> {
        let message = self.require(message_id).await?;
        Self::require_user(&message)?;

        self.store.update_message_content(message_id, content).await?;
        self.require(message_id).await
    }

    /// Replace a user message's content and delete every reply below it,
    /// in one atomic write.
    pub async fn edit_message(&self, message_id: &str, content: &str) -> Result<EditOutcome> {
        let message = self.require(message_id).await?;
        Self::require_user(&message)?;

        let descendants = self.collect_descendants(message_id).await?;
        let batch = WriteBatch::new()
            .update(message_id, content)
            .delete_all(descendants);

        let deleted = self.commit(&message.thread_id, batch).await?;
        tracing::info!(
            thread_id = %message.thread_id,
            message_id,
            deleted,
            "Message edited"
        );

        Ok(EditOutcome {
            message: self.require(message_id).await?,
            deleted_descendant_count: deleted,
        })
    }

    /// Delete the whole subtree below a message, keeping the message.
    /// Returns 0 for a leaf.
    pub async fn delete_descendants(&self, message_id: &str) -> Result<usize> {
        let message = self.require(message_id).await?;
        let descendants = self.collect_descendants(message_id).await?;
        if descendants.is_empty() {
            return Ok(0);
        }

        let deleted = self
            .commit(&message.thread_id, WriteBatch::new().delete_all(descendants))
            .await?;
        tracing::info!(thread_id = %message.thread_id, message_id, deleted, "Descendants deleted");
        Ok(deleted)
    }

    /// Delete a message together with its subtree. Returns the number of
    /// messages removed, the message itself included.
    pub async fn delete_message(&self, message_id: &str) -> Result<usize> {
        let message = self.require(message_id).await?;
        let mut doomed = self.collect_descendants(message_id).await?;
        doomed.push(message.id.clone());

        let deleted = self
            .commit(&message.thread_id, WriteBatch::new().delete_all(doomed))
            .await?;
        tracing::info!(thread_id = %message.thread_id, message_id, deleted, "Message deleted");
        Ok(deleted)
    }

    /// Create an alternative to `clicked_id`: a new sibling under the
    /// clicked message's parent. Branching from a root starts a new root.
    pub async fn create_branch(
        &self,
        clicked_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Result<Message> {
        let clicked = self.require(clicked_id).await?;

        let new = NewMessage::new(&clicked.thread_id, role, content)
            .with_parent(clicked.parent_message_id.clone());
        let branch = self.store.create_message(new).await?;

        tracing::info!(
            thread_id = %branch.thread_id,
            clicked_id,
            message_id = %branch.id,
            "Branch created"
        );
        Ok(branch)
    }

    pub async fn set_context_flag(&self, message_id: &str, is_context: bool) -> Result<Message> {
        let message = self.store.set_context_flag(message_id, is_context).await?;
        tracing::info!(message_id, is_context, "Context flag set");
        Ok(message)
    }

    /// Ids of every transitive descendant, breadth-first.
    pub async fn collect_descendants(&self, message_id: &str) -> Result<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::from([message_id.to_string()]);
        let mut queue: VecDeque<String> = VecDeque::from([message_id.to_string()]);
        let mut out = Vec::new();

        while let Some(id) = queue.pop_front() {
            for child in self.store.get_children(&id).await? {
                if seen.insert(child.id.clone()) {
                    out.push(child.id.clone());
                    queue.push_back(child.id);
                }
            }
        }

        Ok(out)
    }

    async fn commit(&self, thread_id: &str, batch: WriteBatch) -> Result<usize> {
        self.store.commit(batch).await.map_err(|e| {
            let err = EngineError::from(e);
            if let EngineError::Storage(source) = &err {
                tracing::error!(thread_id, error = %source, "Cascade write failed, nothing applied");
            }
            err
        })
    }
}
