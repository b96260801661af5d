//! The language-model collaborator seen by the turn loop.
//!
//! The [`ChatEngine`](crate::agent::engine::ChatEngine) only needs one
//! operation from a model: given the conversation and the tool catalog, either
//! answer with text or ask for a batch of tool calls. Anything that can do
//! that implements [`ChatModel`]; [`CompletionsClient`](super::CompletionsClient)
//! is the HTTP implementation, tests use scripted fakes.

use crate::{Message, ToolCall, ToolDef};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ChatModel::complete`].
pub type ModelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModelReply, ModelError>> + Send + 'a>>;

/// What the model produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A final answer for the user.
    FinalText(String),
    /// One or more tool invocations, in the order the model requested them.
    ToolCalls(Vec<ToolCall>),
}

/// A failed model call. Every variant triggers the turn loop's recovery path.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Network-level failure (connect, timeout, body read).
    #[error("request failed: {0}")]
    Transport(String),
    /// Non-success HTTP status.
    #[error("model API HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The API answered 200 with an error object.
    #[error("model API error: {0}")]
    Api(String),
    /// The response body did not match the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),
    /// No choices, or a choice with neither text nor tool calls.
    #[error("empty model response")]
    Empty,
}

impl ModelError {
    /// Whether the failure is worth retrying as-is (rate limits, 5xx,
    /// network errors). Context-length rejections come back as 400 and are
    /// left to the turn loop's recompaction instead.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            ModelError::Api(_) | ModelError::Parse(_) | ModelError::Empty => false,
        }
    }
}

/// A model that can complete a conversation, optionally calling tools.
///
/// Must fail loudly: transport errors, rate limits and rejected requests are
/// returned as [`ModelError`] so the caller can recompact and retry.
pub trait ChatModel: Send + Sync {
    /// Complete the conversation with the given tool catalog available.
    fn complete<'a>(&'a self, messages: &'a [Message], tools: &'a [ToolDef]) -> ModelFuture<'a>;
}
