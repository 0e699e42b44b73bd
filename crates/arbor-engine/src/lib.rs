//! Structural edits and turn generation over conversation trees.

mod config;
mod editor;
mod error;
mod service;

pub use config::ConversationConfig;
pub use editor::{CascadeEditor, EditOutcome};
pub use error::{EngineError, ErrorKind, Result};
pub use service::{
    thread_name, ConversationService, ConversationServiceBuilder, GenerateOptions, SendMessage,
    ThreadView, TurnOutcome,
};
