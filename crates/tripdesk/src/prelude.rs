//! Convenience re-exports for common `tripdesk` types.
//!
//! ```ignore
//! use tripdesk::prelude::*;
//! ```
//!
//! Covers what an embedder needs to stand up a [`ChatEngine`]: the message
//! types, the model client, the tool dispatcher, short circuits and config.
//! Individual strategies and catalog argument types stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, ToolCall, ToolDef, json_schema_for};

// ── Model ───────────────────────────────────────────────────────────
pub use crate::api::{ChatModel, CompletionsClient, ModelError, ModelReply, RetryConfig};

// ── Conversation runtime ────────────────────────────────────────────
pub use crate::agent::{
    ChatConfig, ChatContext, ChatEngine, ChatError, EvictionPolicy, FormatError, SessionStore,
    ShortCircuit, ShortCircuitTable, TurnReply,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{CompactionStrategy, ContextManager, estimate_tokens};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    FnTool, Tool, ToolDispatcher, ToolError, ToolFuture, UnavailableTool, parse_tool_args,
};
