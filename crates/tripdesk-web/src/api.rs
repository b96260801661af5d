//! Request and response bodies for `POST /chat` and its handler.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use tripdesk::agent::{ChatEngine, ChatError, TurnReply};

/// Shared application state passed to handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub turn_timeout: Duration,
}

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted or empty to start a new conversation.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// JSON body of every non-200 answer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// Failures a chat request can end in. Internal details stay in the logs.
#[derive(Debug)]
pub enum ApiError {
    MissingMessage,
    Timeout,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::MissingMessage => (StatusCode::BAD_REQUEST, "Missing message"),
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "The assistant took too long to answer",
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The assistant could not answer right now, please try again",
            ),
        };
        (
            status,
            Json(ErrorBody {
                error: error.to_string(),
            }),
        )
            .into_response()
    }
}

/// POST /chat: run one conversation turn.
///
/// Returns 200 with the reply, 400 when the body is missing, malformed or
/// has an empty message, 504 when the turn outlives the deadline, and 500
/// for any other turn failure.
pub async fn post_chat(
    State(app): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<TurnReply>, ApiError> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected chat body: {rejection}");
            return Err(ApiError::MissingMessage);
        }
    };
    if request.message.trim().is_empty() {
        return Err(ApiError::MissingMessage);
    }

    match app
        .engine
        .handle_turn_with_timeout(request.conversation_id, request.message, app.turn_timeout)
        .await
    {
        Ok(reply) => Ok(Json(reply)),
        Err(ChatError::Timeout(after)) => {
            warn!("Chat turn timed out after {after:?}");
            Err(ApiError::Timeout)
        }
        Err(e) => {
            error!("Chat turn failed: {e}");
            Err(ApiError::Internal)
        }
    }
}
