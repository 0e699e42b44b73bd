//! # Arbor
//!
//! Branching conversation trees for LLM chat.
//!
//! A thread stores its messages as a tree: every message points at its
//! parent, and siblings are alternative branches. Arbor assembles that tree,
//! resolves the path a model should see, compresses it to a token budget,
//! and keeps the tree consistent under edits (editing a user turn deletes
//! the replies below it, atomically).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arbor::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = Arc::new(OpenAIClient::new(std::env::var("OPENAI_API_KEY")?)?);
//!
//!     let service = ConversationService::builder()
//!         .store(Arc::new(MemoryStore::new()))
//!         .provider(provider)
//!         .config(ConversationConfig::new().with_model("gpt-4o-mini"))
//!         .build()?;
//!
//!     let turn = service.send_message(SendMessage::new("Hello!")).await?;
//!     if let Some(reply) = turn.reply {
//!         println!("{}", reply.content);
//!     }
//!
//!     // Try a different question from the same point
//!     let branch = service
//!         .branch_and_generate(&turn.message.id, "Hi, who are you?", GenerateOptions::default())
//!         .await?;
//!     println!("{:?}", branch.reply.map(|m| m.content));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`arbor-llm`**: completion provider abstraction (OpenAI, mock)
//! - **`arbor-persist`**: thread and message storage (in-memory, MongoDB)
//! - **`arbor-context`**: tree assembly, path resolution, compression
//! - **`arbor-engine`**: cascade edits and turn generation
//!
//! ## License
//!
//! MIT

pub mod prelude;

pub use arbor_llm::{
    ChatOptions, ClientFactory, Completion, CompletionProvider, CompletionRequest, Content,
    Message, MockProvider, MockResponse, OpenAIClient, ProviderConfig, ProviderType, TokenUsage,
};

pub use arbor_persist::{
    MemoryStore, Message as StoredMessage, MessageRole, MessageStore, NewMessage, NewThread,
    PersistError, StoreBackend, StoreBuilder, Thread, ThreadUpdate, WriteBatch,
};

#[cfg(feature = "mongodb")]
pub use arbor_persist::MongoMessageStore;

pub use arbor_context::{
    compose_system_prompt, resolve_path, CharRatioEstimator, ContextCompressor, ContextStrategy,
    ContextTarget, ContextWindow, DefaultContextStrategy, ThreadTree, TiktokenEstimator,
    TokenEstimator, TreeNode,
};

pub use arbor_engine::{
    CascadeEditor, ConversationConfig, ConversationService, EditOutcome, EngineError,
    GenerateOptions, SendMessage, ThreadView, TurnOutcome,
};
