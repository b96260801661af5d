//! Model interaction layer: the [`ChatModel`] seam, the HTTP client, and retry.
//!
//! - [`model`]: [`ChatModel`] trait, [`ModelReply`] and [`ModelError`].
//! - [`client`]: [`CompletionsClient`], a reqwest-based chat-completions
//!   client that implements [`ChatModel`].
//! - [`retry`]: exponential backoff for transient failures. Off by default so
//!   failures reach the turn loop's recovery path immediately.

pub mod client;
pub mod model;
pub mod retry;

pub use client::{CompletionsClient, OPENAI_URL};
pub use model::{ChatModel, ModelError, ModelFuture, ModelReply};
pub use retry::RetryConfig;
