//! HTTP front end for the tripdesk travel assistant.
//!
//! `tripdesk-web` exposes a single JSON endpoint, `POST /chat`, in front of a
//! shared [`ChatEngine`]. Each request runs one conversation turn under a
//! deadline and answers with the reply and the conversation id to send back
//! on the next message.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tripdesk::prelude::*;
//! use tripdesk_web::{WebConfig, spawn_web};
//!
//! let engine = Arc::new(ChatEngine::new(ChatContext::new(
//!     Arc::new(model),
//!     ToolDispatcher::new().with_travel_catalog(),
//!     ShortCircuitTable::travel(),
//!     ChatConfig::default(),
//! )));
//! let addr = spawn_web(engine, WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Wire format
//!
//! ```text
//! POST /chat {"message": "...", "conversation_id": "..."?}
//!   200 {"reply": "...", "conversation_id": "..."}
//!   400 {"error": "Missing message"}
//!   500 {"error": "..."}
//!   504 {"error": "..."}
//! ```

mod api;
mod server;

pub use api::{ChatRequest, ErrorBody};
pub use server::{build_router, start_server};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tripdesk::agent::ChatEngine;

/// Default per-turn deadline.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Deadline for one conversation turn. Requests that exceed it get a 504.
    pub turn_timeout: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

/// Bind the listener and serve on a Tokio task.
///
/// Returns the bound address, which differs from `config.bind_addr` when
/// binding port 0. The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    engine: Arc<ChatEngine>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = build_router(engine, config.turn_timeout);
    start_server(router, config.bind_addr).await
}
