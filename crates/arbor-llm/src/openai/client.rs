// OpenAI-compatible chat completions client

use crate::traits::{ChatOptions, Completion, CompletionProvider, CompletionRequest, TokenUsage};
use crate::types::{Content, ContentPart, Message};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI client (HTTP direct, no SDK)
pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenAIClient {
    /// Create new client with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: OPENAI_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Point the client at any OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model used when a request does not name one
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build chat completion request payload
    pub(crate) fn build_chat_request(
        &self,
        request: &CompletionRequest,
    ) -> Result<Value> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let openai_messages: Vec<Value> = request
            .full_messages()
            .into_iter()
            .map(convert_message)
            .collect();

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(model));
        payload.insert("messages".to_string(), Value::Array(openai_messages));
        payload.insert("stream".to_string(), json!(false));
        apply_options(&mut payload, model, &request.options);

        Ok(Value::Object(payload))
    }
}

fn apply_options(payload: &mut Map<String, Value>, model: &str, options: &ChatOptions) {
    // o1 and gpt-5 models take different parameter names and reject temperature
    let is_reasoning_model = model.starts_with("o1") || model.starts_with("gpt-5");

    if let Some(temp) = options.temperature {
        if !is_reasoning_model {
            payload.insert("temperature".to_string(), json!(temp));
        }
    }
    if let Some(max_tokens) = options.max_tokens {
        let token_field = if is_reasoning_model {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        payload.insert(token_field.to_string(), json!(max_tokens));
    }
}

/// Convert our Message type to OpenAI format
fn convert_message(message: Message) -> Value {
    let (role, content, name) = match message {
        Message::System { content, name } => ("system", content, name),
        Message::Human { content, name } => ("user", content, name),
        Message::AI { content, name } => ("assistant", content, name),
    };

    let mut obj = Map::new();
    obj.insert("role".to_string(), json!(role));
    obj.insert("content".to_string(), convert_content(content));
    if let Some(name) = name {
        obj.insert("name".to_string(), json!(name));
    }
    Value::Object(obj)
}

/// Convert Content to OpenAI format (string or array)
fn convert_content(content: Content) -> Value {
    match content {
        Content::Text(s) => json!(s),
        Content::Parts(parts) => {
            let converted: Vec<Value> = parts
                .into_iter()
                .map(|ContentPart::Text { text }| {
                    json!({
                        "type": "text",
                        "text": text,
                    })
                })
                .collect();
            json!(converted)
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let payload = self.build_chat_request(&request)?;

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let raw: OpenAIChatResponse = response
            .json()
            .await
            .context("Failed to parse response")?;

        let choice = raw
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("OpenAI API returned no choices"))?;
        let finish_reason = choice.finish_reason;
        let content = choice
            .message
            .content
            .ok_or_else(|| anyhow::anyhow!("OpenAI API returned no content"))?;

        let usage = raw
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            finish_reason = finish_reason.as_deref().unwrap_or("unknown"),
            "Chat completion received"
        );

        Ok(Completion { content, usage })
    }
}

// ============================================================================
// OPENAI-SPECIFIC RESPONSE TYPES (for Chat Completions)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new("sk-test").unwrap()
    }

    #[test]
    fn test_payload_prepends_system_prompt() {
        let request = CompletionRequest::new(vec![Message::human("hi")])
            .with_system_prompt(Some("be brief".to_string()));

        let payload = client().build_chat_request(&request).unwrap();
        let messages = payload["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be brief");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(payload["model"], DEFAULT_MODEL);
        assert_eq!(payload["stream"], false);
    }

    #[test]
    fn test_payload_uses_request_model_and_options() {
        let request = CompletionRequest::new(vec![Message::ai("ok")])
            .with_model("gpt-4o")
            .with_options(ChatOptions::new().temperature(0.2).max_tokens(64));

        let payload = client().build_chat_request(&request).unwrap();

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["max_tokens"], 64);
        assert!(payload.get("temperature").is_some());
    }

    #[test]
    fn test_reasoning_models_use_completion_token_field() {
        let request = CompletionRequest::new(vec![Message::human("x")])
            .with_model("o1-mini")
            .with_options(ChatOptions::new().temperature(0.2).max_tokens(10));

        let payload = client().build_chat_request(&request).unwrap();

        assert_eq!(payload["max_completion_tokens"], 10);
        assert!(payload.get("max_tokens").is_none());
        assert!(payload.get("temperature").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client().with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }
}
