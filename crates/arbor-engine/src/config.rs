use std::time::Duration;

use arbor_llm::ChatOptions;

/// Settings for [`ConversationService`](crate::ConversationService).
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Model used when a request names none
    pub model: String,
    /// Token budget for the in-context path
    pub max_context_tokens: usize,
    pub completion_timeout: Duration,
    /// Request-level system prompt used when a call supplies none
    pub default_system_prompt: Option<String>,
    pub chat_options: ChatOptions,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_context_tokens: 30_000,
            completion_timeout: Duration::from_secs(60),
            default_system_prompt: None,
            chat_options: ChatOptions::default(),
        }
    }
}

impl ConversationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_default_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = Some(prompt.into());
        self
    }

    pub fn with_chat_options(mut self, options: ChatOptions) -> Self {
        self.chat_options = options;
        self
    }
}
