//! Tool abstraction and dispatch.
//!
//! The [`Tool`] trait defines the interface every collaborator operation
//! implements: a static API definition (name, description, JSON schema) and
//! an async `execute` method over already-parsed JSON arguments. Tools are
//! collected into a [`ToolDispatcher`], which handles lookup, argument
//! checks, timing, and conversion of every failure into a structured error
//! result the model can read.

use crate::ToolDef;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Characters of serialized tool output kept in the conversation.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 10_000;

/// Result returned when no tool matches the requested name.
pub const UNKNOWN_FUNCTION: &str = "Unknown function";

/// Result returned when a tool fails. The cause is logged, never shown.
pub const OPAQUE_ERROR: &str = "error";

/// Result returned when the arguments are not a JSON object.
pub const INVALID_ARGUMENTS: &str = "Invalid arguments";

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// Why a tool could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The backing service failed.
    #[error("tool failed: {0}")]
    Failed(String),
    /// Arguments did not match the tool's parameters.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool is registered but has no backend in this deployment.
    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// Build the `{"error": reason}` marker fed back to the model.
pub fn error_result(reason: &str) -> Value {
    json!({ "error": reason })
}

// ── Tool trait ─────────────────────────────────────────────────────

/// An operation the model can invoke via function-calling.
///
/// # Example
///
/// ```ignore
/// struct Geocoder { client: reqwest::Client }
///
/// impl Tool for Geocoder {
///     fn definition(&self) -> ToolDef { mapbox_search_def() }
///
///     fn execute(&self, arguments: Value) -> ToolFuture<'_> {
///         Box::pin(async move {
///             let args: MapboxSearchArgs = parse_tool_args(arguments)?;
///             // call the geocoding API
///             todo!()
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with a JSON object of named arguments.
    fn execute(&self, arguments: Value) -> ToolFuture<'_>;

    /// The tool's name (delegates to the definition).
    fn name(&self) -> String {
        self.definition().function.name
    }
}

// ── ToolDispatcher ─────────────────────────────────────────────────

/// Name-keyed registry of tools.
///
/// [`dispatch`](Self::dispatch) never fails: unknown names, malformed
/// arguments, timeouts and tool errors all become `{"error": ...}` values.
///
/// # Example
///
/// ```ignore
/// let tools = ToolDispatcher::new()
///     .with_travel_catalog()
///     .with(FnTool::new(search_hotels_def(), |args: SearchHotelsArgs| async move {
///         inventory.search(args).await
///     }))
///     .with_arg_validation(true)
///     .with_timeout(Some(Duration::from_secs(30)));
///
/// let result = tools.dispatch("search_hotels", r#"{"preference_text":"quiet"}"#).await;
/// ```
pub struct ToolDispatcher {
    tools: BTreeMap<String, Box<dyn Tool>>,
    validate_args: bool,
    timeout: Option<Duration>,
}

impl fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("validate_args", &self.validate_args)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            validate_args: false,
            timeout: None,
        }
    }

    /// Check arguments against each tool's JSON Schema before executing.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Bound each tool execution. `None` disables the bound.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Definitions for the model, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the tool called `name` with raw JSON `arguments`.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Value {
        let Some(tool) = self.tools.get(name) else {
            warn!("[tool] unknown function '{name}'");
            return error_result(UNKNOWN_FUNCTION);
        };

        let args = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!("[tool] {name}: {e}");
                return error_result(INVALID_ARGUMENTS);
            }
        };

        if self.validate_args
            && let Err(e) = validate_tool_arguments(tool.as_ref(), &args)
        {
            warn!("[tool] {name}: {e}");
            return error_result(INVALID_ARGUMENTS);
        }

        log_tool_call(name, arguments);
        let start = Instant::now();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(args)).await {
                Ok(r) => r,
                Err(_) => Err(ToolError::Failed(format!(
                    "timed out after {:.0}s",
                    limit.as_secs_f64()
                ))),
            },
            None => tool.execute(args).await,
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(result) => {
                info!("[tool] {name} completed in {elapsed_ms:.0}ms");
                trace!("[tool] {name} result: {result}");
                result
            }
            Err(e) => {
                warn!("[tool] {name} failed after {elapsed_ms:.0}ms: {e}");
                error_result(OPAQUE_ERROR)
            }
        }
    }
}

/// Parse the model's argument string into a JSON object.
///
/// An empty string is treated as no arguments.
fn parse_arguments(arguments: &str) -> Result<Value, ToolError> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

// ── UnavailableTool ────────────────────────────────────────────────

/// A tool the model can see but that always fails.
///
/// Registers an operation whose backend is not wired into this deployment,
/// keeping its description and schema in the catalog.
#[derive(Debug, Clone)]
pub struct UnavailableTool {
    def: ToolDef,
    reason: String,
}

impl UnavailableTool {
    pub fn new(def: ToolDef, reason: impl Into<String>) -> Self {
        Self {
            def,
            reason: reason.into(),
        }
    }
}

impl Tool for UnavailableTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, _arguments: Value) -> ToolFuture<'_> {
        let err = ToolError::Unavailable(self.reason.clone());
        Box::pin(async move { Err(err) })
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<dyn Fn(Value) -> ToolFuture<'static> + Send + Sync>;

/// A closure-based tool with typed arguments and a serializable output.
///
/// Use [`FnTool`] to plug a backend in without a dedicated struct.
///
/// # Example
///
/// ```ignore
/// let tool = FnTool::new(check_availability_def(), |args: CheckAvailabilityArgs| async move {
///     pricing.quote(&args.property_id, &args.in_date, &args.out_date)
///         .await
///         .map_err(|e| ToolError::Failed(e.to_string()))
/// });
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    /// Create a closure-based tool.
    ///
    /// Arguments are deserialized into `A`; a mismatch is reported as
    /// [`ToolError::InvalidArguments`] without calling the handler.
    pub fn new<A, R, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
    {
        let erased = move |raw: Value| -> ToolFuture<'static> {
            let args: A = match parse_tool_args(raw) {
                Ok(a) => a,
                Err(e) => return Box::pin(async move { Err(e) }),
            };
            let fut = handler(args);
            Box::pin(async move {
                let out = fut.await?;
                serde_json::to_value(out).map_err(|e| ToolError::Failed(e.to_string()))
            })
        };

        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: Value) -> ToolFuture<'_> {
        (self.handler)(arguments)
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Deserialize a JSON argument object into a typed struct.
pub fn parse_tool_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Validate arguments against the tool's declared JSON Schema.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &Value) -> Result<(), ToolError> {
    let schema = tool.definition().function.parameters;
    // An invalid schema is the tool author's problem; skip validation.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(errors.join("; ")))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    debug!("[tool] {name} arguments: {arguments}");
}

/// Serialize a tool result and keep its first `max_chars` characters.
pub fn truncate_result(result: &Value, max_chars: usize) -> String {
    let text = result.to_string();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            debug!(
                "Tool result truncated to {max_chars} of {} chars",
                text.chars().count()
            );
            text.get(..cut).unwrap_or_default().to_string()
        }
        None => text,
    }
}
