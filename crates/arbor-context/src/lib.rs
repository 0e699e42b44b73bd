//! Context assembly for branching conversations.
//!
//! A thread's flat message list is assembled into a [`ThreadTree`]; a
//! context path is resolved through it, filtered by each message's context
//! flag, and compressed to a token budget before the completion call.

mod compress;
mod path;
mod persona;
mod strategy;
mod tree;

pub use compress::{
    compress, CharRatioEstimator, Compressed, ContextCompressor, TiktokenEstimator, TokenEstimator,
};
pub use path::{context_messages, resolve_path};
pub use persona::compose_system_prompt;
pub use strategy::{ContextStrategy, ContextTarget, ContextWindow, DefaultContextStrategy};
pub use tree::{ThreadTree, TreeNode};
