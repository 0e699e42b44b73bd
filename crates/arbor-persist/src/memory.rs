use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{PersistError, Result};
use crate::models::{Message, NewMessage, NewThread, Thread, ThreadUpdate};
use crate::store::{MessageStore, WriteBatch};

/// In-process store backed by hash maps behind one `RwLock`.
///
/// Each trait call takes the lock once, so every call (and in particular
/// every `commit`) is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    threads: HashMap<String, Thread>,
    messages: HashMap<String, Message>,
    /// thread id → message ids in creation order
    by_thread: HashMap<String, Vec<String>>,
    /// parent id → child ids in creation order
    children: HashMap<String, Vec<String>>,
}

impl State {
    fn live_thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.get(thread_id).filter(|t| !t.is_deleted())
    }

    fn live_thread_mut(&mut self, thread_id: &str) -> Result<&mut Thread> {
        self.threads
            .get_mut(thread_id)
            .filter(|t| !t.is_deleted())
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    fn live_message(&self, message_id: &str) -> Option<&Message> {
        self.messages
            .get(message_id)
            .filter(|m| self.live_thread(&m.thread_id).is_some())
    }

    fn collect(&self, ids: Option<&Vec<String>>) -> Vec<Message> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.messages.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }

    fn remove_message(&mut self, message_id: &str) -> bool {
        let Some(message) = self.messages.remove(message_id) else {
            return false;
        };
        if let Some(ids) = self.by_thread.get_mut(&message.thread_id) {
            ids.retain(|id| id != message_id);
        }
        if let Some(parent_id) = &message.parent_message_id {
            if let Some(siblings) = self.children.get_mut(parent_id) {
                siblings.retain(|id| id != message_id);
            }
        }
        self.children.remove(message_id);
        true
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_thread(&self, new: NewThread) -> Result<Thread> {
        let thread = new.into_thread(new_id(), Utc::now());
        let mut state = self.state.write().await;
        state.by_thread.insert(thread.id.clone(), Vec::new());
        state.threads.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let state = self.state.read().await;
        Ok(state.live_thread(thread_id).cloned())
    }

    async fn list_threads(&self, limit: Option<usize>) -> Result<Vec<Thread>> {
        let state = self.state.read().await;
        let mut threads: Vec<Thread> = state
            .threads
            .values()
            .filter(|t| !t.is_deleted())
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            threads.truncate(limit);
        }
        Ok(threads)
    }

    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<Thread> {
        let mut state = self.state.write().await;
        let thread = state.live_thread_mut(thread_id)?;
        update.apply(thread, Utc::now());
        Ok(thread.clone())
    }

    async fn touch_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.live_thread_mut(thread_id)?.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let thread = state.live_thread_mut(thread_id)?;
        let now = Utc::now();
        thread.deleted_at = Some(now);
        thread.updated_at = now;
        Ok(())
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let mut state = self.state.write().await;

        if state.live_thread(&new.thread_id).is_none() {
            return Err(PersistError::ThreadNotFound(new.thread_id));
        }
        if let Some(parent_id) = &new.parent_message_id {
            let same_thread = state
                .messages
                .get(parent_id)
                .is_some_and(|p| p.thread_id == new.thread_id);
            if !same_thread {
                return Err(PersistError::ParentNotFound(parent_id.clone()));
            }
        }

        let now = Utc::now();
        let message = new.into_message(new_id(), now);

        state
            .by_thread
            .entry(message.thread_id.clone())
            .or_default()
            .push(message.id.clone());
        if let Some(parent_id) = &message.parent_message_id {
            state
                .children
                .entry(parent_id.clone())
                .or_default()
                .push(message.id.clone());
        }
        state.live_thread_mut(&message.thread_id)?.updated_at = now;
        state.messages.insert(message.id.clone(), message.clone());

        Ok(message)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        let state = self.state.read().await;
        Ok(state.live_message(message_id).cloned())
    }

    async fn get_messages_by_thread(&self, thread_id: &str) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        if state.live_thread(thread_id).is_none() {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(state.collect(state.by_thread.get(thread_id)))
    }

    async fn get_children(&self, message_id: &str) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        if state.live_message(message_id).is_none() {
            return Err(PersistError::MessageNotFound(message_id.to_string()));
        }
        Ok(state.collect(state.children.get(message_id)))
    }

    async fn set_context_flag(&self, message_id: &str, is_context: bool) -> Result<Message> {
        let mut state = self.state.write().await;
        let thread_id = state
            .live_message(message_id)
            .map(|m| m.thread_id.clone())
            .ok_or_else(|| PersistError::MessageNotFound(message_id.to_string()))?;

        let now = Utc::now();
        let message = state
            .messages
            .get_mut(message_id)
            .ok_or_else(|| PersistError::MessageNotFound(message_id.to_string()))?;
        message.is_context = is_context;
        message.updated_at = Some(now);
        let updated = message.clone();

        state.live_thread_mut(&thread_id)?.updated_at = now;
        Ok(updated)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<usize> {
        let mut state = self.state.write().await;

        // Validate everything before the first write.
        for update in &batch.updates {
            if state.live_message(&update.message_id).is_none() {
                return Err(PersistError::MessageNotFound(update.message_id.clone()));
            }
        }
        let doomed: HashSet<&str> = batch.deletes.iter().map(String::as_str).collect();
        for id in &batch.deletes {
            let orphan = state
                .children
                .get(id)
                .and_then(|kids| kids.iter().find(|k| !doomed.contains(k.as_str())));
            if let Some(orphan) = orphan {
                return Err(PersistError::Conflict(format!(
                    "deleting {id} would orphan child {orphan}"
                )));
            }
        }

        let now = Utc::now();
        let mut touched: HashSet<String> = HashSet::new();

        for update in batch.updates {
            if let Some(message) = state.messages.get_mut(&update.message_id) {
                message.content = update.content;
                message.updated_at = Some(now);
                touched.insert(message.thread_id.clone());
            }
        }

        let mut deleted = 0;
        for id in &batch.deletes {
            if let Some(thread_id) = state.messages.get(id).map(|m| m.thread_id.clone()) {
                if state.remove_message(id) {
                    deleted += 1;
                    touched.insert(thread_id);
                }
            }
        }

        for thread_id in touched {
            if let Some(thread) = state.threads.get_mut(&thread_id) {
                thread.updated_at = now;
            }
        }

        tracing::debug!(deleted, "Write batch committed");
        Ok(deleted)
    }
}
