//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use tripdesk::agent::ChatEngine;

use crate::api::{self, AppState};

/// Build the router serving `POST /chat` behind a permissive CORS layer.
pub fn build_router(engine: Arc<ChatEngine>, turn_timeout: Duration) -> Router {
    let app_state = AppState {
        engine,
        turn_timeout,
    };

    // Browser front ends are served from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(api::post_chat))
        .with_state(app_state)
        .layer(cors)
}

/// Bind `bind_addr`, serve `router` on a Tokio task, return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server stopped: {e}");
        }
    });

    Ok(addr)
}
