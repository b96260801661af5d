//! Token accounting over structured message sequences.
//!
//! The cost of a message is the token count of its role name, plus its
//! content (empty when null), plus the JSON form of its `tool_calls` payload
//! when present. Strings are tokenized with the `gpt-4o` BPE vocabulary,
//! falling back to `cl100k_base`, and finally to a characters-per-token
//! heuristic if neither vocabulary loads.

use crate::Message;
use std::sync::LazyLock;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Characters per token used when no BPE vocabulary is available.
pub const FALLBACK_CHARS_PER_TOKEN: f64 = 3.5;

/// Model whose vocabulary is tried first.
const TOKENIZER_MODEL: &str = "gpt-4o";

static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| {
    tiktoken_rs::get_bpe_from_model(TOKENIZER_MODEL)
        .or_else(|_| tiktoken_rs::cl100k_base())
        .map_err(|e| warn!("No BPE vocabulary available ({e}); using heuristic token counts"))
        .ok()
});

/// Count the tokens in a single string.
pub fn count_text(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match ENCODER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => (text.chars().count() as f64 / FALLBACK_CHARS_PER_TOKEN).ceil() as usize,
    }
}

/// Token cost of one message.
pub fn message_tokens(message: &Message) -> usize {
    let mut total = count_text(message.role.as_str());
    total += count_text(message.content.as_deref().unwrap_or(""));
    if let Some(ref calls) = message.tool_calls {
        // Serialization of plain structs cannot fail; an empty string costs nothing.
        total += count_text(&serde_json::to_string(calls).unwrap_or_default());
    }
    total
}

/// Total token cost of a message sequence.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(message_tokens).sum()
}
