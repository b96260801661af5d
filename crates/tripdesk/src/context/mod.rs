//! Context window management: token accounting and compaction.
//!
//! 1. **[`tokens`]** estimates the cost of a message sequence.
//!
//! 2. **[`strategies`]** holds the four compaction strategies:
//!    - **truncate** drops the oldest messages after the leading system
//!      message.
//!    - **smart_compression** keeps system messages and the last five turns.
//!    - **summarize** folds messages older than the recent window into a
//!      synthesized summary.
//!    - **clean_tools** drops tool round-trips outside the recent window.
//!
//! 3. **[`manager`]** applies a strategy when a conversation exceeds its
//!    budget and logs what was removed.

pub mod manager;
pub mod strategies;
pub mod tokens;

pub use manager::{ContextManager, DEFAULT_MAX_CONTEXT_TOKENS, manage_context};
pub use strategies::{
    CompactionStrategy, UnknownStrategy, clean_tool_history, smart_compression, summarize,
    truncate,
};
pub use tokens::{estimate_tokens, message_tokens};
