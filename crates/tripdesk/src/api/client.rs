//! Async HTTP client for OpenAI-compatible chat completions.

use super::model::{ChatModel, ModelError, ModelFuture, ModelReply};
use super::retry::{RetryConfig, retry_model_call};
use crate::agent::ChatConfig;
use crate::{Message, ToolCall, ToolDef};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default chat-completions endpoint.
pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [ToolDef]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Chat-completions client bound to one model.
///
/// Talks to OpenAI by default; any compatible endpoint works via
/// [`with_base_url`](Self::with_base_url).
pub struct CompletionsClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    retry: RetryConfig,
}

impl std::fmt::Debug for CompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionsClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl CompletionsClient {
    /// Create a client for `model` with a 120 s request timeout.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .user_agent("tripdesk/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: OPENAI_URL.to_string(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            retry: RetryConfig::default(),
        })
    }

    /// Create a client with the model and sampling settings of `config`.
    pub fn from_config(
        api_key: impl Into<String>,
        config: &ChatConfig,
    ) -> Result<Self, ModelError> {
        let mut client = Self::new(api_key, config.model.clone())?;
        client.max_tokens = config.max_tokens;
        client.temperature = config.temperature;
        Ok(client)
    }

    /// Point the client at a different chat-completions URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Cap the response length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Retry transient failures before surfacing them.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The model this client requests.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body for `messages`, offering `tools` when there are any.
    pub fn request<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDef],
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            tools: (!tools.is_empty()).then_some(tools),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Send one chat completion request.
    pub async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<ModelReply, ModelError> {
        let body = self.request(messages, tools);
        debug!(
            "LLM request: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            tools.len(),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ModelError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_completion(&text)
    }
}

impl ChatModel for CompletionsClient {
    fn complete<'a>(&'a self, messages: &'a [Message], tools: &'a [ToolDef]) -> ModelFuture<'a> {
        Box::pin(retry_model_call(&self.retry, move || self.chat(messages, tools)))
    }
}

/// Turn a raw response body into a [`ModelReply`].
fn parse_completion(text: &str) -> Result<ModelReply, ModelError> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| ModelError::Parse(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ModelError::Api(err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let message = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .map(|c| c.message)
        .ok_or(ModelError::Empty)?;

    match (message.tool_calls, message.content) {
        (Some(calls), _) if !calls.is_empty() => {
            debug!("LLM output: {} tool call(s)", calls.len());
            Ok(ModelReply::ToolCalls(calls))
        }
        (_, Some(content)) => {
            debug!("LLM output: {} chars text", content.len());
            Ok(ModelReply::FinalText(content))
        }
        _ => Err(ModelError::Empty),
    }
}
