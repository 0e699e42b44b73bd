use chrono::{DateTime, Utc};
use mongodb::bson;
use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageRole, Thread};

/// Thread document. Ids are the uuid strings used everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoThread {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub system_prompt: Option<String>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    /// Stored as explicit `null` while live so `{deleted_at: null}` filters work
    pub deleted_at: Option<bson::DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub parent_message_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub is_context: bool,
    pub created_at: bson::DateTime,
    pub updated_at: Option<bson::DateTime>,
}

pub fn to_bson_time(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(dt.timestamp_millis())
}

pub fn from_bson_time(dt: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

/// Current time at the precision Mongo keeps, so returned values match reads.
pub fn now_millis() -> DateTime<Utc> {
    from_bson_time(to_bson_time(Utc::now()))
}

impl From<&Thread> for MongoThread {
    fn from(thread: &Thread) -> Self {
        Self {
            id: thread.id.clone(),
            name: thread.name.clone(),
            system_prompt: thread.system_prompt.clone(),
            created_at: to_bson_time(thread.created_at),
            updated_at: to_bson_time(thread.updated_at),
            deleted_at: thread.deleted_at.map(to_bson_time),
        }
    }
}

impl From<MongoThread> for Thread {
    fn from(thread: MongoThread) -> Self {
        Self {
            id: thread.id,
            name: thread.name,
            system_prompt: thread.system_prompt,
            created_at: from_bson_time(thread.created_at),
            updated_at: from_bson_time(thread.updated_at),
            deleted_at: thread.deleted_at.map(from_bson_time),
        }
    }
}

impl From<&Message> for MongoMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
            parent_message_id: msg.parent_message_id.clone(),
            role: msg.role,
            content: msg.content.clone(),
            is_context: msg.is_context,
            created_at: to_bson_time(msg.created_at),
            updated_at: msg.updated_at.map(to_bson_time),
        }
    }
}

impl From<MongoMessage> for Message {
    fn from(msg: MongoMessage) -> Self {
        Self {
            id: msg.id,
            thread_id: msg.thread_id,
            parent_message_id: msg.parent_message_id,
            role: msg.role,
            content: msg.content,
            is_context: msg.is_context,
            created_at: from_bson_time(msg.created_at),
            updated_at: msg.updated_at.map(from_bson_time),
        }
    }
}
