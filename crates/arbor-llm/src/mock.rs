use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::traits::{Completion, CompletionProvider, CompletionRequest, TokenUsage};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return the text as the assistant reply.
    Text(String),
    /// Fail the call with the given message.
    Error(String),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence and
/// records every request it receives.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Provider that answers every call with the same text.
    pub fn replying(text: impl Into<String>, times: usize) -> Self {
        let text = text.into();
        Self::new((0..times).map(|_| MockResponse::text(text.clone())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests seen so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn push(&self, response: MockResponse) {
        self.responses.lock().await.push_back(response);
    }
}

fn estimate(text: &str) -> u32 {
    u32::try_from(text.chars().count() / 4).unwrap_or(u32::MAX)
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let prompt_tokens = request
            .full_messages()
            .iter()
            .map(|m| estimate(&m.text()))
            .fold(0u32, u32::saturating_add);
        self.requests.lock().await.push(request);

        let mut next = self
            .responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("MockProvider: no scripted response left"))?;

        loop {
            match next {
                MockResponse::Text(content) => {
                    let usage = TokenUsage::new(prompt_tokens, estimate(&content));
                    return Ok(Completion { content, usage });
                }
                MockResponse::Error(message) => anyhow::bail!(message),
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    next = *inner;
                }
            }
        }
    }
}
