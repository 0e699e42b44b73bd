// Configuration layer for provider-agnostic client creation
// This module provides a factory pattern for creating completion providers from configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::traits::CompletionProvider;

/// Type of completion provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Mock,
}

impl Default for ProviderType {
    fn default() -> Self {
        ProviderType::OpenAI
    }
}

/// Configuration for OpenAI (or any OpenAI-compatible) provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// Base URL for the API (optional, defaults to https://api.openai.com/v1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model used when a request does not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

/// Canned replies for offline runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub replies: Vec<String>,
}

/// Provider-specific configuration details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderDetails {
    OpenAI(OpenAIConfig),
    Mock(MockConfig),
}

/// Complete provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub details: ProviderDetails,
}

impl ProviderConfig {
    /// Create OpenAI provider config
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            details: ProviderDetails::OpenAI(OpenAIConfig::new(api_key)),
        }
    }

    pub fn openai_with(config: OpenAIConfig) -> Self {
        Self {
            details: ProviderDetails::OpenAI(config),
        }
    }

    /// Create a mock provider config that replays `replies` in order
    pub fn mock(replies: Vec<String>) -> Self {
        Self {
            details: ProviderDetails::Mock(MockConfig { replies }),
        }
    }

    /// Get the provider type
    pub fn provider_type(&self) -> ProviderType {
        match self.details {
            ProviderDetails::OpenAI(_) => ProviderType::OpenAI,
            ProviderDetails::Mock(_) => ProviderType::Mock,
        }
    }
}

/// Factory for creating completion providers from configuration
pub struct ClientFactory;

impl ClientFactory {
    pub fn create_provider(config: ProviderConfig) -> Result<Arc<dyn CompletionProvider>> {
        match config.details {
            ProviderDetails::OpenAI(openai_config) => {
                let mut client = crate::openai::OpenAIClient::new(openai_config.api_key)?;
                if let Some(base_url) = openai_config.base_url {
                    client = client.with_base_url(base_url);
                }
                if let Some(model) = openai_config.default_model {
                    client = client.with_default_model(model);
                }
                Ok(Arc::new(client))
            }
            ProviderDetails::Mock(mock_config) => {
                let responses = mock_config
                    .replies
                    .into_iter()
                    .map(crate::mock::MockResponse::Text)
                    .collect();
                Ok(Arc::new(crate::mock::MockProvider::new(responses)))
            }
        }
    }
}
