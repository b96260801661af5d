//! Command-line tools for tripdesk conversations.
//!
//! # Examples
//!
//! ```sh
//! # Compact a saved conversation to 8k tokens with the summarize strategy
//! tripdesk compact --strategy summarize --max-tokens 8000 conversation.json
//!
//! # Count the tokens of a conversation piped on stdin
//! cat conversation.json | tripdesk tokens
//!
//! # Chat with the assistant in the terminal
//! OPENAI_API_KEY=... tripdesk chat
//! ```

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tripdesk::agent::{ChatConfig, ChatContext, ChatEngine, ShortCircuitTable};
use tripdesk::api::{CompletionsClient, OPENAI_URL, RetryConfig};
use tripdesk::context::{
    CompactionStrategy, DEFAULT_MAX_CONTEXT_TOKENS, estimate_tokens, manage_context,
};
use tripdesk::tools::ToolDispatcher;
use tripdesk::{DEFAULT_MODEL, Message};

/// Inspect, compact and chat with tripdesk conversations.
#[derive(Parser)]
#[command(name = "tripdesk", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compact a JSON message array and print the result
    Compact {
        /// Compaction strategy: truncate, smart_compression, summarize or clean_tools
        #[arg(long, env = "TRIPDESK_STRATEGY", default_value = "smart_compression")]
        strategy: CompactionStrategy,

        /// Token budget
        #[arg(
            long,
            env = "TRIPDESK_MAX_CONTEXT_TOKENS",
            default_value_t = DEFAULT_MAX_CONTEXT_TOKENS
        )]
        max_tokens: usize,

        /// Conversation file (reads stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Print the token estimate of a JSON message array
    Tokens {
        /// Conversation file (reads stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Chat with the assistant on stdin/stdout
    Chat {
        /// API key for the chat-completions endpoint
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Model name
        #[arg(long, env = "TRIPDESK_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// Chat-completions URL
        #[arg(long, env = "TRIPDESK_BASE_URL", default_value = OPENAI_URL)]
        base_url: String,

        /// Compaction strategy
        #[arg(long, env = "TRIPDESK_STRATEGY", default_value = "smart_compression")]
        strategy: CompactionStrategy,

        /// Context budget in tokens
        #[arg(
            long,
            env = "TRIPDESK_MAX_CONTEXT_TOKENS",
            default_value_t = DEFAULT_MAX_CONTEXT_TOKENS
        )]
        max_context_tokens: usize,

        /// Per-turn timeout in seconds
        #[arg(long, env = "TRIPDESK_TURN_TIMEOUT_SECS", default_value_t = 120)]
        turn_timeout_secs: u64,

        /// Retries for transient model errors
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_messages(file: Option<&Path>) -> Result<Vec<Message>, String> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
    };
    serde_json::from_str(&content).map_err(|e| format!("invalid message array: {e}"))
}

fn compact(
    strategy: CompactionStrategy,
    max_tokens: usize,
    file: Option<&Path>,
) -> Result<(), String> {
    let messages = read_messages(file)?;
    let before = (messages.len(), estimate_tokens(&messages));
    let compacted = manage_context(messages, strategy, max_tokens);
    let after = (compacted.len(), estimate_tokens(&compacted));

    let json = serde_json::to_string_pretty(&compacted)
        .map_err(|e| format!("failed to serialize result: {e}"))?;
    println!("{json}");
    eprintln!(
        "{strategy}: {} -> {} messages, {} -> {} tokens (budget {max_tokens})",
        before.0, after.0, before.1, after.1
    );
    Ok(())
}

fn tokens(file: Option<&Path>) -> Result<(), String> {
    let messages = read_messages(file)?;
    println!("{}", estimate_tokens(&messages));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn chat(
    api_key: String,
    model: String,
    base_url: String,
    strategy: CompactionStrategy,
    max_context_tokens: usize,
    turn_timeout_secs: u64,
    retries: u32,
) -> Result<(), String> {
    let config = ChatConfig::new()
        .with_model(model)
        .with_strategy(strategy)
        .with_max_context_tokens(max_context_tokens);
    let client = CompletionsClient::from_config(api_key, &config)
        .map_err(|e| e.to_string())?
        .with_base_url(base_url)
        .with_retry(RetryConfig::with_retries(retries));
    let tools = ToolDispatcher::new()
        .with_travel_catalog()
        .with_arg_validation(true);
    let engine = ChatEngine::new(ChatContext::new(
        Arc::new(client),
        tools,
        ShortCircuitTable::travel(),
        config,
    ));

    let timeout = Duration::from_secs(turn_timeout_secs);
    let mut conversation_id: Option<String> = None;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().map_err(|e| e.to_string())?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match engine
            .handle_turn_with_timeout(conversation_id.clone(), line, timeout)
            .await
        {
            Ok(reply) => {
                println!("{}\n", reply.reply);
                conversation_id = Some(reply.conversation_id);
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Compact {
            strategy,
            max_tokens,
            file,
        } => compact(strategy, max_tokens, file.as_deref()),
        Command::Tokens { file } => tokens(file.as_deref()),
        Command::Chat {
            api_key,
            model,
            base_url,
            strategy,
            max_context_tokens,
            turn_timeout_secs,
            retries,
        } => {
            chat(
                api_key,
                model,
                base_url,
                strategy,
                max_context_tokens,
                turn_timeout_secs,
                retries,
            )
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn transcript(messages: &[Message]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(messages).unwrap().as_bytes())
            .unwrap();
        file
    }

    #[test]
    fn reads_message_arrays_from_files() {
        let messages = vec![Message::system("sys"), Message::user("Hotels in Porto?")];
        let file = transcript(&messages);
        assert_eq!(read_messages(Some(file.path())).unwrap(), messages);
    }

    #[test]
    fn rejects_malformed_transcripts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"role\": \"user\"}").unwrap();
        let err = read_messages(Some(file.path())).unwrap_err();
        assert!(err.contains("invalid message array"));
    }

    #[test]
    fn compact_and_tokens_run_on_files() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..40 {
            messages.push(Message::user(format!("question {i}")));
            messages.push(Message::assistant_text(format!("answer {i}")));
        }
        let file = transcript(&messages);
        assert!(compact(CompactionStrategy::Truncate, 50, Some(file.path())).is_ok());
        assert!(tokens(Some(file.path())).is_ok());
        assert!(tokens(Some(Path::new("/nonexistent/conversation.json"))).is_err());
    }

    #[test]
    fn cli_parses_strategy_names() {
        let cli = Cli::try_parse_from([
            "tripdesk",
            "compact",
            "--strategy",
            "clean_tools",
            "--max-tokens",
            "10",
        ])
        .unwrap();
        match cli.command {
            Command::Compact {
                strategy,
                max_tokens,
                file,
            } => {
                assert_eq!(strategy, CompactionStrategy::CleanTools);
                assert_eq!(max_tokens, 10);
                assert!(file.is_none());
            }
            _ => panic!("expected compact"),
        }
        assert!(Cli::try_parse_from(["tripdesk", "compact", "--strategy", "aggressive"]).is_err());
    }
}
