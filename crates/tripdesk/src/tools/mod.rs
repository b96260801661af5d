//! Tool abstractions and the travel catalog.
//!
//! Every collaborator operation the model can call is a [`Tool`] trait
//! implementor. Tools are collected into a [`ToolDispatcher`], which maps a
//! name and JSON arguments to a result and turns every failure into an
//! `{"error": ...}` value.
//!
//! # Defining tools
//!
//! - **[`FnTool`]** wraps an async closure with typed arguments.
//! - **`impl Tool`** for tools with their own state (HTTP clients, caches).
//! - **[`UnavailableTool`]** keeps an operation visible to the model while it
//!   has no backend.
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`], [`ToolDispatcher`], [`FnTool`], [`UnavailableTool`],
//!   result truncation and argument validation.
//! - [`catalog`]: argument types and definitions for the travel operations,
//!   plus the in-process reservation tool.

pub mod catalog;
pub mod core;

pub use catalog::SendReservationRequest;
pub use core::{
    DEFAULT_MAX_RESULT_CHARS, FnTool, Tool, ToolDispatcher, ToolError, ToolFuture,
    UnavailableTool, error_result, parse_tool_args, truncate_result, validate_tool_arguments,
};
