//! Travel assistant HTTP server.
//!
//! # Usage
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run -p tripdesk-web
//! OPENAI_API_KEY=sk-... cargo run -p tripdesk-web -- --port 8080 --strategy summarize
//! ```
//!
//! Then talk to it with curl:
//!
//! ```bash
//! curl -s localhost:3001/chat -H 'content-type: application/json' \
//!   -d '{"message": "Find me a hotel near the Berlin office"}'
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tripdesk::DEFAULT_MODEL;
use tripdesk::api::OPENAI_URL;
use tripdesk::context::DEFAULT_MAX_CONTEXT_TOKENS;
use tripdesk::prelude::*;
use tripdesk_web::{WebConfig, spawn_web};

/// Travel assistant HTTP server.
#[derive(Parser)]
#[command(about = "Serve the travel assistant over POST /chat")]
struct Args {
    /// API key for the chat-completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Model name.
    #[arg(long, env = "TRIPDESK_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Chat-completions URL.
    #[arg(long, env = "TRIPDESK_BASE_URL", default_value = OPENAI_URL)]
    base_url: String,

    /// Compaction strategy: truncate, smart_compression, summarize or clean_tools.
    #[arg(long, env = "TRIPDESK_STRATEGY", default_value = "smart_compression")]
    strategy: CompactionStrategy,

    /// Context budget in tokens.
    #[arg(
        long,
        env = "TRIPDESK_MAX_CONTEXT_TOKENS",
        default_value_t = DEFAULT_MAX_CONTEXT_TOKENS
    )]
    max_context_tokens: usize,

    /// Per-turn timeout in seconds.
    #[arg(long, env = "TRIPDESK_TURN_TIMEOUT_SECS", default_value_t = 120)]
    turn_timeout_secs: u64,

    /// Retries for transient model errors.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Dispatch a batch of tool calls concurrently.
    #[arg(long)]
    parallel_tools: bool,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    // 1. Engine settings.
    let config = ChatConfig::new()
        .with_model(args.model)
        .with_strategy(args.strategy)
        .with_max_context_tokens(args.max_context_tokens)
        .with_parallel_tool_dispatch(args.parallel_tools);

    // 2. Model client built from the same settings.
    let client = CompletionsClient::from_config(args.api_key, &config)
        .map_err(|e| e.to_string())?
        .with_base_url(args.base_url)
        .with_retry(RetryConfig::with_retries(args.retries));

    // 3. Tool catalog. Operations without a backend answer with an error
    //    result so the model can tell the user.
    let tools = ToolDispatcher::new()
        .with_travel_catalog()
        .with_arg_validation(true);

    // 4. Engine shared by every request.
    let engine = Arc::new(ChatEngine::new(ChatContext::new(
        Arc::new(client),
        tools,
        ShortCircuitTable::travel(),
        config,
    )));

    // 5. Serve until Ctrl-C.
    let web_config = WebConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
        turn_timeout: Duration::from_secs(args.turn_timeout_secs),
    };
    let addr = spawn_web(engine, web_config)
        .await
        .map_err(|e| format!("failed to bind: {e}"))?;
    info!(%addr, strategy = %args.strategy, "Listening");
    println!("Listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
    info!("Shutting down");
    Ok(())
}
