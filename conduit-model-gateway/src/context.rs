//! Context strategy for managing the conversation window.
//!
//! The [`ContextStrategy`] trait handles client-side context compaction.
//! Provider-native truncation (e.g., OpenAI `truncation: auto`) is
//! invisible to the strategy — handled by the Provider impl internally.

use crate::types::{ContentPart, ProviderMessage};

/// Strategy for managing context window size.
///
/// Implementations: `NoCompaction` (passthrough), `SlidingWindow`
/// (drop oldest messages, keep the first).
pub trait ContextStrategy: Send + Sync {
    /// Estimate token count for a message list.
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize;

    /// Whether compaction should run given the current messages and limit.
    fn should_compact(&self, messages: &[ProviderMessage], limit: usize) -> bool;

    /// Compact the message list. Returns a shorter list.
    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage>;
}

fn estimate_tokens(messages: &[ProviderMessage]) -> usize {
    // Rough estimate: 4 chars per token.
    messages
        .iter()
        .flat_map(|m| &m.content)
        .map(|part| match part {
            ContentPart::Text { text } => text.len() / 4,
            ContentPart::ToolUse { input, .. } => input.to_string().len() / 4,
            ContentPart::ToolResult { content, .. } => content.len() / 4,
            ContentPart::Image { .. } => 1000, // rough image token estimate
        })
        .sum()
}

/// A no-op context strategy that never compacts.
///
/// Useful for short conversations or when the provider handles
/// truncation natively.
pub struct NoCompaction;

impl ContextStrategy for NoCompaction {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        estimate_tokens(messages)
    }

    fn should_compact(&self, _messages: &[ProviderMessage], _limit: usize) -> bool {
        false
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        messages
    }
}

/// Keeps the first message (the task framing) plus the most recent
/// `window_size` messages, dropping everything in between once the
/// estimated token count crosses the caller-supplied limit.
pub struct SlidingWindow {
    window_size: usize,
}

impl SlidingWindow {
    /// Create a sliding window that retains the first message plus the
    /// last `window_size` messages once compaction triggers.
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }
}

impl ContextStrategy for SlidingWindow {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        estimate_tokens(messages)
    }

    fn should_compact(&self, messages: &[ProviderMessage], limit: usize) -> bool {
        estimate_tokens(messages) > limit
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        if messages.len() <= self.window_size + 1 {
            return messages;
        }

        let mut kept = Vec::with_capacity(self.window_size + 1);
        kept.push(messages[0].clone());
        kept.extend(messages[messages.len() - self.window_size..].iter().cloned());
        kept
    }
}
