mod message;
mod thread;

pub use message::{Message, MessageRole, NewMessage};
pub use thread::{NewThread, Thread, ThreadUpdate};
