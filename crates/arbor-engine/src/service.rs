use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use arbor_context::{
    ContextCompressor, ContextStrategy, ContextTarget, ContextWindow, DefaultContextStrategy,
    ThreadTree, TokenEstimator, TreeNode,
};
use arbor_llm::{CompletionProvider, CompletionRequest, TokenUsage};
use arbor_persist::{
    Message, MessageRole, MessageStore, NewMessage, NewThread, Thread, ThreadUpdate,
};

use crate::config::ConversationConfig;
use crate::editor::{CascadeEditor, EditOutcome};
use crate::error::{EngineError, Result};

const THREAD_NAME_CHARS: usize = 50;
const UNTITLED_THREAD: &str = "New conversation";

/// Per-call overrides for generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub content: String,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

impl SendMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of a user-side mutation followed by a generation attempt.
///
/// `message` is the user-side message that was written (sent, edited or
/// branched). It stays persisted when generation fails; the failure is
/// reported in `generation_error` and `reply` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub thread: Thread,
    pub message: Message,
    pub reply: Option<Message>,
    pub usage: Option<TokenUsage>,
    pub generation_error: Option<String>,
    pub deleted_descendant_count: usize,
}

/// A thread rendered for display.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub thread: Thread,
    pub tree: Vec<TreeNode>,
    pub deepest_path: Vec<Message>,
}

struct Generation {
    reply: Option<Message>,
    usage: Option<TokenUsage>,
    error: Option<String>,
}

/// The operations the API layer calls.
pub struct ConversationService {
    store: Arc<dyn MessageStore>,
    editor: CascadeEditor,
    provider: Arc<dyn CompletionProvider>,
    strategy: Arc<dyn ContextStrategy>,
    config: ConversationConfig,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn CompletionProvider>,
        config: ConversationConfig,
    ) -> Self {
        let strategy = Arc::new(DefaultContextStrategy::with_max_tokens(config.max_context_tokens));
        Self::new_with_strategy(store, provider, strategy, config)
    }

    pub fn new_with_strategy(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn CompletionProvider>,
        strategy: Arc<dyn ContextStrategy>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            editor: CascadeEditor::new(Arc::clone(&store)),
            store,
            provider,
            strategy,
            config,
        }
    }

    pub fn builder() -> ConversationServiceBuilder {
        ConversationServiceBuilder::new()
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn editor(&self) -> &CascadeEditor {
        &self.editor
    }

    pub async fn create_thread(&self, new: NewThread) -> Result<Thread> {
        let thread = self.store.create_thread(new).await?;
        tracing::info!(thread_id = %thread.id, "Thread created");
        Ok(thread)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        self.store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))
    }

    pub async fn list_threads(&self, limit: Option<usize>) -> Result<Vec<Thread>> {
        Ok(self.store.list_threads(limit).await?)
    }

    pub async fn update_thread(&self, thread_id: &str, update: ThreadUpdate) -> Result<Thread> {
        Ok(self.store.update_thread(thread_id, update).await?)
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.store.soft_delete_thread(thread_id).await?;
        tracing::info!(thread_id, "Thread deleted");
        Ok(())
    }

    pub async fn get_thread_tree(&self, thread_id: &str) -> Result<ThreadView> {
        let thread = self.get_thread(thread_id).await?;
        let messages = self.store.get_messages_by_thread(thread_id).await?;
        let tree = ThreadTree::build(messages);
        tracing::debug!(thread_id, messages = tree.len(), "Thread tree assembled");

        Ok(ThreadView {
            tree: tree.to_forest(),
            deepest_path: tree.find_deepest_path().into_iter().cloned().collect(),
            thread,
        })
    }

    /// Context a model would see when the user selects `message_id`.
    pub async fn get_context_for_message(&self, message_id: &str) -> Result<ContextWindow> {
        let message = self.require_message(message_id).await?;
        let thread = self.get_thread(&message.thread_id).await?;
        let window = self
            .strategy
            .get_context_window(
                self.store.as_ref(),
                &thread,
                ContextTarget::View(message_id),
                self.config.default_system_prompt.as_deref(),
            )
            .await?;
        Ok(window)
    }

    pub async fn edit_message(&self, message_id: &str, content: &str) -> Result<EditOutcome> {
        self.editor.edit_message(message_id, content).await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<usize> {
        self.editor.delete_message(message_id).await
    }

    pub async fn create_branch(
        &self,
        clicked_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Result<Message> {
        self.editor.create_branch(clicked_id, content, role).await
    }

    pub async fn set_message_context_flag(&self, message_id: &str, is_context: bool) -> Result<Message> {
        self.editor.set_context_flag(message_id, is_context).await
    }

    /// Persist a user turn (creating the thread when none is given) and
    /// generate the assistant reply beneath it.
    pub async fn send_message(&self, request: SendMessage) -> Result<TurnOutcome> {
        let SendMessage {
            thread_id,
            parent_id,
            content,
            options,
        } = request;

        let thread = match (thread_id, &parent_id) {
            (Some(id), _) => self.get_thread(&id).await?,
            (None, Some(parent)) => {
                let parent = self.store.get_message(parent).await?.ok_or_else(|| {
                    EngineError::ParentNotFound(parent.clone())
                })?;
                self.get_thread(&parent.thread_id).await?
            }
            (None, None) => self.create_thread(NewThread::new(thread_name(&content))).await?,
        };

        let message = self
            .editor
            .add_message(NewMessage::user(&thread.id, content).with_parent(parent_id))
            .await?;

        self.finish_turn(thread, message, 0, &options).await
    }

    /// Generate a fresh reply. For a user message the reply becomes a new
    /// child; for an assistant message it becomes a sibling of it.
    pub async fn regenerate(&self, message_id: &str, options: GenerateOptions) -> Result<TurnOutcome> {
        let message = self.require_message(message_id).await?;
        let anchor = match message.role {
            MessageRole::User => message,
            MessageRole::Assistant => {
                let parent_id = message.parent_message_id.as_deref().ok_or_else(|| {
                    EngineError::InvalidState(format!(
                        "assistant message {message_id} has no prompt to regenerate from"
                    ))
                })?;
                self.require_message(parent_id).await?
            }
        };
        let thread = self.get_thread(&anchor.thread_id).await?;

        self.finish_turn(thread, anchor, 0, &options).await
    }

    /// Edit a user message (pruning its replies) and generate a new reply.
    /// The edit is kept when generation fails.
    pub async fn edit_and_regenerate(
        &self,
        message_id: &str,
        content: &str,
        options: GenerateOptions,
    ) -> Result<TurnOutcome> {
        let edit = self.editor.edit_message(message_id, content).await?;
        let thread = self.get_thread(&edit.message.thread_id).await?;

        self.finish_turn(thread, edit.message, edit.deleted_descendant_count, &options)
            .await
    }

    /// Branch a user message off `clicked_id` and generate a reply to it.
    pub async fn branch_and_generate(
        &self,
        clicked_id: &str,
        content: &str,
        options: GenerateOptions,
    ) -> Result<TurnOutcome> {
        let branch = self
            .editor
            .create_branch(clicked_id, content, MessageRole::User)
            .await?;
        let thread = self.get_thread(&branch.thread_id).await?;

        self.finish_turn(thread, branch, 0, &options).await
    }

    async fn finish_turn(
        &self,
        thread: Thread,
        message: Message,
        deleted_descendant_count: usize,
        options: &GenerateOptions,
    ) -> Result<TurnOutcome> {
        let generation = self.generate(&thread, &message, options).await?;
        let thread = self.store.get_thread(&thread.id).await?.unwrap_or(thread);

        Ok(TurnOutcome {
            thread,
            message,
            reply: generation.reply,
            usage: generation.usage,
            generation_error: generation.error,
            deleted_descendant_count,
        })
    }

    /// Ask the provider for a reply to `anchor` and store it as its child.
    ///
    /// Provider errors and timeouts are returned inside [`Generation`];
    /// only storage errors fail the call.
    async fn generate(
        &self,
        thread: &Thread,
        anchor: &Message,
        options: &GenerateOptions,
    ) -> Result<Generation> {
        let request_prompt = options
            .system_prompt
            .as_deref()
            .or(self.config.default_system_prompt.as_deref());

        let window = self
            .strategy
            .get_context_window(
                self.store.as_ref(),
                thread,
                ContextTarget::ReplyTo(&anchor.id),
                request_prompt,
            )
            .await?;

        tracing::debug!(
            thread_id = %thread.id,
            message_id = %anchor.id,
            estimated_tokens = window.estimated_tokens,
            dropped = window.dropped,
            kept = window.messages.len(),
            "Context window ready"
        );

        let model = options.model.clone().unwrap_or_else(|| self.config.model.clone());
        let request = CompletionRequest::new(window.messages)
            .with_model(model)
            .with_system_prompt(window.system_prompt)
            .with_options(self.config.chat_options.clone());

        let completion = match tokio::time::timeout(
            self.config.completion_timeout,
            self.provider.complete(request),
        )
        .await
        {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => return Ok(self.failed(anchor, EngineError::Upstream(e.to_string()))),
            Err(_) => {
                return Ok(self.failed(anchor, EngineError::Timeout(self.config.completion_timeout)))
            }
        };

        let reply = self
            .editor
            .add_message(NewMessage::assistant(&thread.id, completion.content).child_of(&anchor.id))
            .await?;

        tracing::info!(
            thread_id = %thread.id,
            message_id = %reply.id,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "Reply generated"
        );

        Ok(Generation {
            reply: Some(reply),
            usage: Some(completion.usage),
            error: None,
        })
    }

    fn failed(&self, anchor: &Message, err: EngineError) -> Generation {
        tracing::warn!(
            thread_id = %anchor.thread_id,
            message_id = %anchor.id,
            error = %err,
            "Generation failed, user turn kept"
        );
        Generation {
            reply: None,
            usage: None,
            error: Some(err.to_string()),
        }
    }

    async fn require_message(&self, message_id: &str) -> Result<Message> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| EngineError::MessageNotFound(message_id.to_string()))
    }
}

/// Display name for a thread started by `content`.
pub fn thread_name(content: &str) -> String {
    let single_line = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.is_empty() {
        return UNTITLED_THREAD.to_string();
    }
    single_line.chars().take(THREAD_NAME_CHARS).collect()
}

/// Builder for [`ConversationService`]
pub struct ConversationServiceBuilder {
    store: Option<Arc<dyn MessageStore>>,
    provider: Option<Arc<dyn CompletionProvider>>,
    strategy: Option<Arc<dyn ContextStrategy>>,
    estimator: Option<Arc<dyn TokenEstimator>>,
    config: ConversationConfig,
}

impl ConversationServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            provider: None,
            strategy: None,
            estimator: None,
            config: ConversationConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replace the default path-compress-compose strategy
    pub fn strategy(mut self, strategy: Arc<dyn ContextStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Token estimator for the default strategy
    pub fn estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> anyhow::Result<ConversationService> {
        let store = self.store.ok_or_else(|| anyhow!("store is required"))?;
        let provider = self.provider.ok_or_else(|| anyhow!("provider is required"))?;

        let strategy = match self.strategy {
            Some(strategy) => strategy,
            None => {
                let mut compressor = ContextCompressor::new(self.config.max_context_tokens);
                if let Some(estimator) = self.estimator {
                    compressor = compressor.with_estimator(estimator);
                }
                Arc::new(DefaultContextStrategy::new(compressor))
            }
        };

        Ok(ConversationService::new_with_strategy(
            store,
            provider,
            strategy,
            self.config,
        ))
    }
}

impl Default for ConversationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_name_single_line_and_truncated() {
        assert_eq!(thread_name("hello\nworld"), "hello world");
        let long = "x".repeat(80);
        assert_eq!(thread_name(&long).chars().count(), 50);
    }

    #[test]
    fn test_thread_name_empty() {
        assert_eq!(thread_name("   \n "), "New conversation");
    }

    #[test]
    fn test_send_message_deserializes_flattened_options() {
        let req: SendMessage =
            serde_json::from_str(r#"{"content":"hi","system_prompt":"be nice"}"#).unwrap();
        assert_eq!(req.content, "hi");
        assert_eq!(req.options.system_prompt.as_deref(), Some("be nice"));
        assert_eq!(req.thread_id, None);
    }

    #[test]
    fn test_builder_requires_store_and_provider() {
        assert!(ConversationService::builder().build().is_err());
    }
}
