use std::sync::Arc;

use anyhow::Result;
use arbor_llm::Message;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Estimates how many tokens a text costs a provider.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate(&m.text())).sum()
    }
}

/// `floor(chars / 4)` per message. Characters are Unicode scalar values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharRatioEstimator;

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / 4
    }
}

/// Exact counts from the cl100k_base BPE.
pub struct TiktokenEstimator {
    bpe: CoreBPE,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| anyhow::anyhow!("Tokenizer error: {}", e))?;
        Ok(Self { bpe })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[derive(Debug, Clone)]
pub struct Compressed {
    pub messages: Vec<Message>,
    pub estimated_tokens: usize,
    /// Number of oldest messages left out
    pub dropped: usize,
}

/// Keeps the longest suffix of a conversation that fits a token budget.
#[derive(Clone)]
pub struct ContextCompressor {
    max_tokens: usize,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextCompressor {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            estimator: Arc::new(CharRatioEstimator),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Returns `messages` unchanged when they fit. Otherwise walks from the
    /// newest message backwards and stops before the first one that would
    /// overflow. The newest message is always kept.
    pub fn compress(&self, messages: Vec<Message>) -> Compressed {
        let costs: Vec<usize> = messages
            .iter()
            .map(|m| self.estimator.estimate(&m.text()))
            .collect();
        let total: usize = costs.iter().sum();

        if total <= self.max_tokens {
            return Compressed {
                messages,
                estimated_tokens: total,
                dropped: 0,
            };
        }

        let mut used = 0;
        let mut keep = 0;
        for &cost in costs.iter().rev() {
            if used + cost > self.max_tokens && keep > 0 {
                break;
            }
            used += cost;
            keep += 1;
            if used > self.max_tokens {
                break;
            }
        }

        let dropped = messages.len() - keep;
        tracing::debug!(
            total_tokens = total,
            kept_tokens = used,
            dropped,
            max_tokens = self.max_tokens,
            "Context compressed"
        );

        Compressed {
            messages: messages.into_iter().skip(dropped).collect(),
            estimated_tokens: used,
            dropped,
        }
    }
}

/// Compress with the default character-ratio estimator.
pub fn compress(messages: Vec<Message>, max_tokens: usize) -> Vec<Message> {
    ContextCompressor::new(max_tokens).compress(messages).messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_ratio_floors() {
        let est = CharRatioEstimator;
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("abc"), 0);
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcdefg"), 1);
    }

    #[test]
    fn test_char_ratio_counts_chars_not_bytes() {
        // 4 chars, 8 bytes
        assert_eq!(CharRatioEstimator.estimate("éééé"), 1);
    }

    #[test]
    fn test_estimate_messages_sums_per_message() {
        let msgs = vec![Message::human("abcdef"), Message::ai("abcdef")];
        assert_eq!(CharRatioEstimator.estimate_messages(&msgs), 2);
    }
}
