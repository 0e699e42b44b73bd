use std::collections::HashSet;

use async_trait::async_trait;
use mongodb::{bson::doc, Client, ClientSession};

use crate::dbs::mongo::models::{now_millis, to_bson_time, MongoMessage, MongoThread};
use crate::dbs::mongo::repositories::{MongoMessageRepository, MongoThreadRepository};
use crate::error::{PersistError, Result};
use crate::models::{Message, NewMessage, NewThread, Thread, ThreadUpdate};
use crate::store::{MessageStore, WriteBatch};

pub struct MongoMessageStore {
    client: Client,
    messages: MongoMessageRepository,
    threads: MongoThreadRepository,
}

impl MongoMessageStore {
    /// Connect to MongoDB and create the store
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let messages = MongoMessageRepository::new(&client, database);
        let threads = MongoThreadRepository::new(&client, database);

        tracing::info!(database, "Connected to MongoDB");

        Ok(Self {
            client,
            messages,
            threads,
        })
    }

    async fn live_message(&self, message_id: &str) -> Result<Option<MongoMessage>> {
        let Some(message) = self.messages.find(message_id).await? else {
            return Ok(None);
        };
        let live = self.threads.find_live(&message.thread_id).await?.is_some();
        Ok(live.then_some(message))
    }

    async fn apply_batch(&self, session: &mut ClientSession, batch: WriteBatch) -> Result<usize> {
        let now = to_bson_time(now_millis());
        let mut touched: HashSet<String> = HashSet::new();

        for update in &batch.updates {
            let target = self.messages.find_in(session, &update.message_id).await?;
            let live = match &target {
                Some(msg) => self.threads.find_live_in(session, &msg.thread_id).await?.is_some(),
                None => false,
            };
            if !live {
                return Err(PersistError::MessageNotFound(update.message_id.clone()));
            }

            self.messages
                .set_content(session, &update.message_id, &update.content, now)
                .await?;
            if let Some(msg) = target {
                touched.insert(msg.thread_id);
            }
        }

        let mut deleted = 0;
        if !batch.deletes.is_empty() {
            if self.messages.count_dangling(session, &batch.deletes).await? > 0 {
                return Err(PersistError::Conflict(
                    "deletion would orphan surviving children".to_string(),
                ));
            }
            touched.extend(self.messages.thread_ids_of(session, &batch.deletes).await?);
            deleted = self.messages.delete_many(session, &batch.deletes).await? as usize;
        }

        self.threads
            .touch_many(session, touched.into_iter().collect(), now)
            .await?;

        Ok(deleted)
    }
}

#[async_trait]
impl MessageStore for MongoMessageStore {
    async fn create_thread(&self, new: NewThread) -> Result<Thread> {
        let thread = new.into_thread(uuid::Uuid::now_v7().to_string(), now_millis());
        self.threads.insert(&MongoThread::from(&thread)).await?;
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        Ok(self.threads.find_live(thread_id).await?.map(Into::into))
    }

    async fn list_threads(&self, limit: Option<usize>) -> Result<Vec<Thread>> {
        let threads = self.threads.list_live(limit).await?;
        Ok(threads.into_iter().map(Into::into).collect())
    }

    async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<Thread> {
        let mut fields = doc! { "updated_at": to_bson_time(now_millis()) };
        if let Some(name) = update.name {
            fields.insert("name", name);
        }
        if let Some(prompt) = update.system_prompt {
            fields.insert("system_prompt", prompt);
        }

        self.threads
            .set_fields(thread_id, fields)
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    async fn touch_thread(&self, thread_id: &str) -> Result<()> {
        let fields = doc! { "updated_at": to_bson_time(now_millis()) };
        self.threads
            .set_fields(thread_id, fields)
            .await?
            .map(|_| ())
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    async fn soft_delete_thread(&self, thread_id: &str) -> Result<()> {
        let now = to_bson_time(now_millis());
        let fields = doc! { "updated_at": now, "deleted_at": now };
        self.threads
            .set_fields(thread_id, fields)
            .await?
            .map(|_| ())
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        if self.threads.find_live(&new.thread_id).await?.is_none() {
            return Err(PersistError::ThreadNotFound(new.thread_id));
        }
        if let Some(parent_id) = &new.parent_message_id {
            let same_thread = self
                .messages
                .find(parent_id)
                .await?
                .is_some_and(|p| p.thread_id == new.thread_id);
            if !same_thread {
                return Err(PersistError::ParentNotFound(parent_id.clone()));
            }
        }

        let message = new.into_message(uuid::Uuid::now_v7().to_string(), now_millis());
        self.messages.insert(&MongoMessage::from(&message)).await?;
        self.touch_thread(&message.thread_id).await?;
        Ok(message)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        Ok(self.live_message(message_id).await?.map(Into::into))
    }

    async fn get_messages_by_thread(&self, thread_id: &str) -> Result<Vec<Message>> {
        if self.threads.find_live(thread_id).await?.is_none() {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }
        let messages = self.messages.find_by_thread(thread_id).await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn get_children(&self, message_id: &str) -> Result<Vec<Message>> {
        if self.live_message(message_id).await?.is_none() {
            return Err(PersistError::MessageNotFound(message_id.to_string()));
        }
        let children = self.messages.find_children(message_id).await?;
        Ok(children.into_iter().map(Into::into).collect())
    }

    async fn set_context_flag(&self, message_id: &str, is_context: bool) -> Result<Message> {
        if self.live_message(message_id).await?.is_none() {
            return Err(PersistError::MessageNotFound(message_id.to_string()));
        }
        let now = now_millis();
        let updated: Message = self
            .messages
            .set_context(message_id, is_context, to_bson_time(now))
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::MessageNotFound(message_id.to_string()))?;
        self.touch_thread(&updated.thread_id).await?;
        Ok(updated)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self.apply_batch(&mut session, batch).await {
            Ok(deleted) => {
                session.commit_transaction().await?;
                tracing::debug!(deleted, "Write batch committed");
                Ok(deleted)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort transaction");
                }
                Err(e)
            }
        }
    }
}
