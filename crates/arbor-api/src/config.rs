use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use arbor_engine::ConversationConfig;
use arbor_llm::{ChatOptions, ProviderType};
use arbor_persist::StoreBackend;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub mongodb_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderType,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// OpenAI-compatible endpoint override
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,
    /// Replies replayed in order by the mock provider
    #[serde(default)]
    pub mock_replies: Vec<String>,
}

fn default_completion_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// floor(chars / 4)
    #[default]
    Chars,
    Tiktoken,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the context path (NOT sent to the provider)
    pub max_tokens: usize,
    #[serde(default)]
    pub estimator: EstimatorKind,
    #[serde(default)]
    pub default_system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. {ARBOR_CONFIG_DIR}/default.toml
    /// 2. {ARBOR_CONFIG_DIR}/{ENV}.toml (if ENV is set)
    /// 3. Environment variables `ARBOR_<SECTION>__<KEY>`, e.g. `ARBOR_SERVER__PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());
        let dir = std::env::var("ARBOR_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name(&format!("{}/default", dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", dir, env)).required(false))
            .add_source(
                Environment::with_prefix("ARBOR")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.origins")
                    .try_parsing(true),
            );

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Load secrets from ENV (not in TOML)
        cfg.openai_api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        cfg.mongodb_uri = std::env::var("MONGODB_URI").ok();
        cfg.validate()?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.provider == ProviderType::OpenAI && self.openai_api_key.is_empty() {
            return Err(ConfigError::Message(
                "OPENAI_API_KEY environment variable is required for the openai provider".to_string(),
            ));
        }
        if self.storage.backend == StoreBackend::MongoDb && self.mongodb_uri.is_none() {
            return Err(ConfigError::Message(
                "MONGODB_URI environment variable is required for the mongodb backend".to_string(),
            ));
        }
        if self.context.max_tokens == 0 {
            return Err(ConfigError::Message("context.max_tokens must be positive".to_string()));
        }
        Ok(())
    }

    pub fn conversation(&self) -> ConversationConfig {
        let mut chat_options = ChatOptions::new();
        if let Some(temp) = self.llm.temperature {
            chat_options = chat_options.temperature(temp);
        }

        let mut conversation = ConversationConfig::new()
            .with_model(&self.llm.model)
            .with_max_context_tokens(self.context.max_tokens)
            .with_completion_timeout(Duration::from_secs(self.llm.completion_timeout_secs))
            .with_chat_options(chat_options);
        if let Some(prompt) = &self.context.default_system_prompt {
            conversation = conversation.with_default_system_prompt(prompt);
        }
        conversation
    }
}
