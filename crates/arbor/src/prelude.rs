//! Prelude module for convenient imports
//!
//! ```rust
//! use arbor::prelude::*;
//! ```

pub use crate::{
    CompletionProvider, ConversationConfig, ConversationService, GenerateOptions, MemoryStore,
    MessageRole, MessageStore, MockProvider, OpenAIClient, SendMessage, StoredMessage, Thread,
    ThreadTree, TurnOutcome,
};
