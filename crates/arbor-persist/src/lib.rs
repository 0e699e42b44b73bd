pub mod models;
pub mod store;
pub mod memory;
pub mod error;
pub mod builder;
pub mod dbs;

pub use models::{Thread, NewThread, ThreadUpdate, Message, MessageRole, NewMessage};
pub use store::{ContentUpdate, MessageStore, WriteBatch};
pub use memory::MemoryStore;
pub use error::{PersistError, Result};
pub use builder::{StoreBackend, StoreBuilder};

#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoMessageStore;
