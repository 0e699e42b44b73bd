pub mod types;
pub mod traits;
pub mod openai;
pub mod mock;
pub mod config;

pub use traits::{
    CompletionProvider,
    CompletionRequest, Completion, ChatOptions,
    TokenUsage,
};

pub use openai::OpenAIClient;
pub use mock::{MockProvider, MockResponse};
pub use config::{ClientFactory, MockConfig, OpenAIConfig, ProviderConfig, ProviderType};
pub use types::{Message, Content, ContentPart};
