//! Conversation runtime: the [`ChatEngine`] turn loop and what it runs on.
//!
//! - [`engine`]: [`ChatEngine`], [`ChatContext`], [`TurnReply`], [`ChatError`].
//!   Start here.
//! - [`config`]: [`ChatConfig`] with defaults and builder methods.
//! - [`session`]: [`SessionStore`], the in-memory conversation map with
//!   eviction and per-conversation locks.
//! - [`short_circuit`]: [`ShortCircuit`] trait and the travel formatters.
//! - [`prompt`]: the default system preamble.

pub mod config;
pub mod engine;
pub mod prompt;
pub mod session;
pub mod short_circuit;

pub use config::ChatConfig;
pub use engine::{ChatContext, ChatEngine, ChatError, TurnReply};
pub use session::{EvictionPolicy, SessionStore};
pub use short_circuit::{FormatError, ShortCircuit, ShortCircuitTable};
