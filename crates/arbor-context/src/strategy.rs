use async_trait::async_trait;
use serde::Serialize;

use arbor_llm::Message;
use arbor_persist::{Message as StoredMessage, MessageStore, Result, Thread};

use crate::compress::ContextCompressor;
use crate::path::{context_messages, resolve_path};
use crate::persona::compose_system_prompt;
use crate::tree::ThreadTree;

/// What the provider will be sent for one completion.
#[derive(Debug, Clone, Serialize)]
pub struct ContextWindow {
    pub system_prompt: Option<String>,
    /// In-context path messages after compression
    pub messages: Vec<Message>,
    /// The resolved path, including messages excluded from context
    pub path: Vec<StoredMessage>,
    pub estimated_tokens: usize,
    /// Oldest in-context messages cut to fit the budget
    pub dropped: usize,
}

/// Where the context path ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTarget<'a> {
    /// Deepest root-to-leaf path of the thread
    Deepest,
    /// Path to a message plus its first reply, as shown when it is selected
    View(&'a str),
    /// Path to a message that is about to receive a new reply
    ReplyTo(&'a str),
}

impl<'a> ContextTarget<'a> {
    pub fn view(message_id: Option<&'a str>) -> Self {
        message_id.map_or(ContextTarget::Deepest, ContextTarget::View)
    }
}

/// Strategy for building the context window of a completion.
#[async_trait]
pub trait ContextStrategy: Send + Sync {
    /// Build the window for `thread`. An unknown target gives an empty path.
    async fn get_context_window(
        &self,
        store: &dyn MessageStore,
        thread: &Thread,
        target: ContextTarget<'_>,
        request_prompt: Option<&str>,
    ) -> Result<ContextWindow>;
}

pub struct DefaultContextStrategy {
    compressor: ContextCompressor,
}

impl DefaultContextStrategy {
    pub fn new(compressor: ContextCompressor) -> Self {
        Self { compressor }
    }

    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self::new(ContextCompressor::new(max_tokens))
    }

    pub fn compressor(&self) -> &ContextCompressor {
        &self.compressor
    }
}

#[async_trait]
impl ContextStrategy for DefaultContextStrategy {
    async fn get_context_window(
        &self,
        store: &dyn MessageStore,
        thread: &Thread,
        target: ContextTarget<'_>,
        request_prompt: Option<&str>,
    ) -> Result<ContextWindow> {
        let messages = store.get_messages_by_thread(&thread.id).await?;
        let tree = ThreadTree::build(messages);

        let path = match target {
            ContextTarget::Deepest => resolve_path(&tree, None),
            ContextTarget::View(id) => resolve_path(&tree, Some(id)),
            ContextTarget::ReplyTo(id) => tree.path_to(id).unwrap_or_default(),
        };
        let compressed = self.compressor.compress(context_messages(&path));

        Ok(ContextWindow {
            system_prompt: compose_system_prompt(request_prompt, thread.system_prompt.as_deref()),
            messages: compressed.messages,
            path: path.into_iter().cloned().collect(),
            estimated_tokens: compressed.estimated_tokens,
            dropped: compressed.dropped,
        })
    }
}
