//! Configuration for the [`ChatEngine`](super::engine::ChatEngine).
//!
//! Every field has a default suited to a single-process deployment; override
//! the common ones with the builder methods.
//!
//! ```ignore
//! let config = ChatConfig::new()
//!     .with_strategy(CompactionStrategy::Summarize)
//!     .with_max_context_tokens(32_000)
//!     .with_max_round_trips(6)
//!     .with_parallel_tool_dispatch(true);
//! ```

use super::prompt::TRAVEL_ASSISTANT_PROMPT;
use super::session::EvictionPolicy;
use crate::DEFAULT_MODEL;
use crate::context::{CompactionStrategy, DEFAULT_MAX_CONTEXT_TOKENS};
use crate::tools::DEFAULT_MAX_RESULT_CHARS;

/// Conversations held before eviction runs.
pub const DEFAULT_MAX_CONVERSATIONS: usize = 100;

/// Conversations left after an eviction pass.
pub const DEFAULT_TARGET_CONVERSATIONS: usize = 50;

/// Model calls allowed per turn.
pub const DEFAULT_MAX_ROUND_TRIPS: usize = 10;

/// Failed model calls tolerated per turn before giving up.
pub const DEFAULT_MAX_MODEL_FAILURES: usize = 3;

/// Settings for one engine instance.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model requested by clients built with
    /// [`CompletionsClient::from_config`](crate::api::CompletionsClient::from_config).
    pub model: String,
    /// Seed message for new conversations.
    pub system_prompt: String,
    /// Compaction strategy applied when a conversation exceeds its budget.
    pub strategy: CompactionStrategy,
    /// Token budget for the conversation sent to the model.
    pub max_context_tokens: usize,
    /// Store size above which eviction runs.
    pub max_conversations: usize,
    /// Store size after eviction.
    pub target_conversations: usize,
    /// Which conversations eviction removes.
    pub eviction_policy: EvictionPolicy,
    /// Model calls allowed in one turn.
    pub max_round_trips: usize,
    /// Characters of serialized tool output kept per result.
    pub max_tool_result_chars: usize,
    /// Failed model calls tolerated in one turn.
    pub max_model_failures: usize,
    /// Dispatch a batch of tool calls concurrently.
    pub parallel_tool_dispatch: bool,
    /// Sampling temperature passed to the model client.
    pub temperature: Option<f32>,
    /// Response length cap passed to the model client.
    pub max_tokens: Option<u32>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: TRAVEL_ASSISTANT_PROMPT.to_string(),
            strategy: CompactionStrategy::SmartCompression,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            target_conversations: DEFAULT_TARGET_CONVERSATIONS,
            eviction_policy: EvictionPolicy::IdOrder,
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            max_tool_result_chars: DEFAULT_MAX_RESULT_CHARS,
            max_model_failures: DEFAULT_MAX_MODEL_FAILURES,
            parallel_tool_dispatch: false,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ChatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Set the eviction threshold and the size eviction shrinks to.
    ///
    /// `target` is clamped to at most `max`.
    pub fn with_capacity(mut self, max: usize, target: usize) -> Self {
        self.max_conversations = max;
        self.target_conversations = target.min(max);
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Cap model calls per turn. Zero is treated as one.
    pub fn with_max_round_trips(mut self, round_trips: usize) -> Self {
        self.max_round_trips = round_trips.max(1);
        self
    }

    pub fn with_max_tool_result_chars(mut self, chars: usize) -> Self {
        self.max_tool_result_chars = chars;
        self
    }

    pub fn with_max_model_failures(mut self, failures: usize) -> Self {
        self.max_model_failures = failures;
        self
    }

    /// Run every call of a multi-call model reply concurrently.
    ///
    /// In parallel mode all calls in the batch are dispatched, even when an
    /// earlier call's result short-circuits the turn. The first short circuit
    /// in call order still supplies the reply and the results of later calls
    /// are discarded. Sequential mode (the default) stops before dispatching
    /// anything after a short-circuiting call.
    pub fn with_parallel_tool_dispatch(mut self, enabled: bool) -> Self {
        self.parallel_tool_dispatch = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
