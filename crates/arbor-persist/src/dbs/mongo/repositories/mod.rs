mod message;
mod thread;

pub use message::MongoMessageRepository;
pub use thread::MongoThreadRepository;
