//! Budget enforcement over a conversation using a selected strategy.

use super::strategies::CompactionStrategy;
use super::tokens::estimate_tokens;
use crate::Message;
use tracing::{debug, info, warn};

/// Default context budget in tokens.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 100_000;

/// Keep `messages` within `max_tokens` using `strategy`.
///
/// Sequences already within budget are returned untouched. Otherwise the
/// strategy runs and the before/after sizes are logged. A result still over
/// budget (the leading system message plus one message that alone exceeds
/// the budget) is accepted with a warning.
pub fn manage_context(
    messages: Vec<Message>,
    strategy: CompactionStrategy,
    max_tokens: usize,
) -> Vec<Message> {
    let before = estimate_tokens(&messages);
    if before <= max_tokens {
        debug!("Context within budget: {before}/{max_tokens} tokens");
        return messages;
    }

    let before_count = messages.len();
    let compacted = strategy.compact(&messages, max_tokens);
    let after = estimate_tokens(&compacted);

    info!(
        "Compacted context with {strategy}: {before_count} -> {} messages, {before} -> {after} tokens (budget {max_tokens})",
        compacted.len(),
    );
    if after > max_tokens {
        warn!(
            "Context still over budget after {strategy}: {after}/{max_tokens} tokens in {} messages",
            compacted.len()
        );
    }
    compacted
}

/// A strategy bound to a budget.
///
/// # Example
///
/// ```ignore
/// let manager = ContextManager::new()
///     .with_strategy(CompactionStrategy::Summarize)
///     .with_max_tokens(8_000);
/// let messages = manager.manage(messages);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextManager {
    strategy: CompactionStrategy,
    max_tokens: usize,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self {
            strategy: CompactionStrategy::default(),
            max_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
        }
    }
}

impl ContextManager {
    /// Smart compression within [`DEFAULT_MAX_CONTEXT_TOKENS`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn strategy(&self) -> CompactionStrategy {
        self.strategy
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Apply the configured strategy and budget.
    pub fn manage(&self, messages: Vec<Message>) -> Vec<Message> {
        manage_context(messages, self.strategy, self.max_tokens)
    }

    /// Share of the budget `messages` uses, as a percentage.
    pub fn usage_percent(&self, messages: &[Message]) -> f64 {
        if self.max_tokens == 0 {
            return 100.0;
        }
        estimate_tokens(messages) as f64 / self.max_tokens as f64 * 100.0
    }
}
