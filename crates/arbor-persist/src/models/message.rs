use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// One turn in a thread; a node of the conversation tree.
///
/// `parent_message_id == None` marks a thread root. Siblings (several
/// messages sharing a parent) are how branches are represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub parent_message_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    /// Whether this turn is included when assembling model context
    pub is_context: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_root(&self) -> bool {
        self.parent_message_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Input for creating a message; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub thread_id: String,
    pub parent_message_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub is_context: bool,
}

impl NewMessage {
    pub fn new(thread_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            parent_message_id: None,
            role,
            content: content.into(),
            is_context: true,
        }
    }

    pub fn user(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, MessageRole::User, content)
    }

    pub fn assistant(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, MessageRole::Assistant, content)
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_message_id = parent_id;
        self
    }

    pub fn child_of(self, parent_id: impl Into<String>) -> Self {
        self.with_parent(Some(parent_id.into()))
    }

    pub fn with_context(mut self, is_context: bool) -> Self {
        self.is_context = is_context;
        self
    }

    pub(crate) fn into_message(self, id: String, now: DateTime<Utc>) -> Message {
        Message {
            id,
            thread_id: self.thread_id,
            parent_message_id: self.parent_message_id,
            role: self.role,
            content: self.content,
            is_context: self.is_context,
            created_at: now,
            updated_at: None,
        }
    }
}

// Conversion: stored Message → arbor_llm::Message
impl From<&Message> for arbor_llm::Message {
    fn from(msg: &Message) -> Self {
        match msg.role {
            MessageRole::User => arbor_llm::Message::human(msg.content.as_str()),
            MessageRole::Assistant => arbor_llm::Message::ai(msg.content.as_str()),
        }
    }
}
