//! The four compaction strategies.
//!
//! Each strategy takes a message sequence and a token budget and returns a
//! reduced sequence. Every strategy:
//!
//! - never returns more tokens than it was given,
//! - keeps retained messages in their original relative order,
//! - never empties a non-empty sequence; when the budget cannot be met, the
//!   leading system message plus the single most recent message is returned
//!   as a tolerated overflow.
//!
//! [`CompactionStrategy`] is the closed set of strategies; its
//! [`compactor`](CompactionStrategy::compactor) maps each variant to the
//! function implementing it.

use super::tokens::{estimate_tokens, message_tokens};
use crate::{Message, MessageRole};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Complete user turns kept by [`smart_compression`].
pub const SMART_KEEP_TURNS: usize = 5;

/// Messages treated as "recent" by [`summarize`].
pub const SUMMARY_RECENT_MESSAGES: usize = 100;

/// Fraction of the budget the recent window may use before old messages are
/// folded into a summary.
pub const SUMMARY_TRIGGER_RATIO: f64 = 0.7;

/// Characters of each old user message quoted in the summary.
pub const SUMMARY_EXCERPT_CHARS: usize = 100;

/// Trailing messages [`clean_tool_history`] never touches.
pub const TOOL_HISTORY_WINDOW: usize = 20;

/// Signature shared by every strategy.
pub type CompactFn = fn(&[Message], usize) -> Vec<Message>;

// ── Strategy selection ────────────────────────────────────────────

/// A context compaction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompactionStrategy {
    /// Drop the oldest non-system messages until under budget.
    Truncate,
    /// Keep system messages plus the last few complete turns.
    #[default]
    SmartCompression,
    /// Fold old messages into a synthesized summary.
    Summarize,
    /// Drop old tool round-trips, then truncate.
    CleanTools,
}

impl CompactionStrategy {
    /// Every strategy, in declaration order.
    pub const ALL: [CompactionStrategy; 4] = [
        CompactionStrategy::Truncate,
        CompactionStrategy::SmartCompression,
        CompactionStrategy::Summarize,
        CompactionStrategy::CleanTools,
    ];

    /// Wire name used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            CompactionStrategy::Truncate => "truncate",
            CompactionStrategy::SmartCompression => "smart_compression",
            CompactionStrategy::Summarize => "summarize",
            CompactionStrategy::CleanTools => "clean_tools",
        }
    }

    /// Resolve a configured name, falling back to
    /// [`SmartCompression`](Self::SmartCompression) for anything unrecognized.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// The function implementing this strategy under a budget.
    pub fn compactor(self) -> CompactFn {
        match self {
            CompactionStrategy::Truncate => truncate,
            CompactionStrategy::SmartCompression => smart_compression,
            CompactionStrategy::Summarize => summarize,
            CompactionStrategy::CleanTools => clean_tools_within_budget,
        }
    }

    /// Apply this strategy.
    pub fn compact(self, messages: &[Message], max_tokens: usize) -> Vec<Message> {
        (self.compactor())(messages, max_tokens)
    }
}

impl fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for a strategy name that matches no variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown compaction strategy '{0}' (expected truncate, smart_compression, summarize or clean_tools)")]
pub struct UnknownStrategy(pub String);

impl FromStr for CompactionStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompactionStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

// ── Truncate ──────────────────────────────────────────────────────

/// Keep the leading system message and drop the oldest remaining messages
/// until the sequence fits `max_tokens` or only one non-system message is
/// left. Tool results whose assistant call was dropped go with it.
pub fn truncate(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }
    let pinned = usize::from(messages[0].role == MessageRole::System);
    let (head, rest) = messages.split_at(pinned);
    truncate_after(head, rest, max_tokens)
}

/// Keep all of `head`, then as much of the end of `rest` as fits.
fn truncate_after(head: &[Message], rest: &[Message], max_tokens: usize) -> Vec<Message> {
    let costs: Vec<usize> = rest.iter().map(message_tokens).collect();
    let mut total: usize = estimate_tokens(head) + costs.iter().sum::<usize>();

    let mut start = 0;
    while total > max_tokens && rest.len() - start > 1 {
        total -= costs[start];
        start += 1;
    }
    // A tool result cannot open the history: its assistant call is gone.
    while rest.len() - start > 1 && rest[start].role == MessageRole::Tool {
        start += 1;
    }

    let mut out = Vec::with_capacity(head.len() + rest.len() - start);
    out.extend_from_slice(head);
    out.extend_from_slice(&rest[start..]);
    out
}

// ── Smart compression ─────────────────────────────────────────────

/// Keep every system message plus the last [`SMART_KEEP_TURNS`] complete
/// user turns, then truncate if still over budget.
///
/// A turn is a user message and the assistant and tool messages that follow
/// it. Returns the input unchanged when already under budget.
pub fn smart_compression(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    if messages.is_empty() || estimate_tokens(messages) <= max_tokens {
        return messages.to_vec();
    }

    let mut turns_kept = 0;
    let mut recent_start = messages.len();
    for (i, msg) in messages.iter().enumerate().rev() {
        if turns_kept == SMART_KEEP_TURNS {
            break;
        }
        if msg.role != MessageRole::System {
            recent_start = i;
            if msg.role == MessageRole::User {
                turns_kept += 1;
            }
        }
    }

    let compressed: Vec<Message> = messages
        .iter()
        .enumerate()
        .filter(|(i, m)| m.role == MessageRole::System || *i >= recent_start)
        .map(|(_, m)| m.clone())
        .collect();

    truncate(&compressed, max_tokens)
}

// ── Summarize ─────────────────────────────────────────────────────

/// Replace messages older than the last [`SUMMARY_RECENT_MESSAGES`] with a
/// synthesized system summary, then truncate to budget.
///
/// The summary is only written when the recent window alone already uses
/// more than [`SUMMARY_TRIGGER_RATIO`] of the budget; otherwise the old
/// messages are simply dropped. Returns the input unchanged when already
/// under budget.
pub fn summarize(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    let input_tokens = estimate_tokens(messages);
    if messages.is_empty() || input_tokens <= max_tokens {
        return messages.to_vec();
    }

    let pinned = usize::from(messages[0].role == MessageRole::System);
    let conversation = &messages[pinned..];
    let split = conversation.len().saturating_sub(SUMMARY_RECENT_MESSAGES);
    let (old, recent) = conversation.split_at(split);

    let mut head: Vec<Message> = messages[..pinned].to_vec();
    let recent_tokens = estimate_tokens(&head) + estimate_tokens(recent);

    if !old.is_empty() && recent_tokens as f64 > max_tokens as f64 * SUMMARY_TRIGGER_RATIO {
        head.push(summary_message(old));
        let floor = estimate_tokens(&head) + recent.last().map_or(0, message_tokens);
        if floor > max_tokens {
            // No room for the summary next to the latest message.
            head.pop();
        }
    }

    let result = truncate_after(&head, recent, max_tokens);
    if estimate_tokens(&result) > input_tokens {
        return truncate(messages, max_tokens);
    }
    result
}

/// Build the system message standing in for `old` messages.
fn summary_message(old: &[Message]) -> Message {
    let mut content = String::from("Previous conversation summary:\n");
    for msg in old {
        match msg.role {
            MessageRole::User => {
                let excerpt: String = msg
                    .content
                    .as_deref()
                    .unwrap_or("")
                    .chars()
                    .take(SUMMARY_EXCERPT_CHARS)
                    .collect();
                content.push_str(&format!("User asked about: {excerpt}...\n"));
            }
            MessageRole::Assistant if !msg.has_tool_calls() => {
                content.push_str("Assistant provided info about hotels/travel.\n");
            }
            _ => {}
        }
    }
    Message::system(content)
}

// ── Clean tool history ────────────────────────────────────────────

/// Drop tool round-trips older than the last [`TOOL_HISTORY_WINDOW`]
/// messages.
///
/// System messages and the trailing window are kept as-is; older messages
/// survive only if they are user messages or assistant messages without a
/// `tool_calls` payload. Tool results whose call was dropped are removed
/// from the window too. Does not enforce a budget.
pub fn clean_tool_history(messages: &[Message]) -> Vec<Message> {
    let window_start = messages.len().saturating_sub(TOOL_HISTORY_WINDOW);
    let cleaned: Vec<Message> = messages
        .iter()
        .enumerate()
        .filter(|(i, m)| match m.role {
            MessageRole::System => true,
            _ if *i >= window_start => true,
            MessageRole::User => true,
            MessageRole::Assistant => !m.has_tool_calls(),
            MessageRole::Tool => false,
        })
        .map(|(_, m)| m.clone())
        .collect();
    drop_orphan_tool_results(cleaned)
}

/// [`clean_tool_history`] followed by [`truncate`].
pub fn clean_tools_within_budget(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    truncate(&clean_tool_history(messages), max_tokens)
}

/// Remove tool messages that do not answer a retained assistant tool call.
/// The final message is always kept so the sequence never empties.
fn drop_orphan_tool_results(messages: Vec<Message>) -> Vec<Message> {
    let mut known_calls: HashSet<String> = HashSet::new();
    let last = messages.len().saturating_sub(1);
    messages
        .into_iter()
        .enumerate()
        .filter_map(|(i, msg)| {
            if let Some(ref calls) = msg.tool_calls {
                known_calls.extend(calls.iter().map(|c| c.id.clone()));
            }
            let orphan = msg.role == MessageRole::Tool
                && !msg
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| known_calls.contains(id));
            (!orphan || i == last).then_some(msg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    fn conversation(turns: usize, words: usize) -> Vec<Message> {
        let mut msgs = vec![Message::system("You are a corporate travel assistant.")];
        for i in 0..turns {
            msgs.push(Message::user(format!("question {i} {}", "hotel ".repeat(words))));
            msgs.push(Message::assistant_text(format!(
                "answer {i} {}",
                "room ".repeat(words)
            )));
        }
        msgs
    }

    fn tool_round(id: &str) -> [Message; 2] {
        [
            Message::assistant_tool_calls(vec![ToolCall::new(id, "search_hotels", "{}")]),
            Message::tool_result(id, format!("[{}]", "{\"name\":\"Hotel\"},".repeat(20))),
        ]
    }

    fn is_subsequence(sub: &[Message], full: &[Message]) -> bool {
        let mut it = full.iter();
        sub.iter().all(|m| it.any(|f| f == m))
    }

    // ── Selection ──

    #[test]
    fn names_round_trip() {
        for strategy in CompactionStrategy::ALL {
            assert_eq!(strategy.name().parse::<CompactionStrategy>(), Ok(strategy));
        }
    }

    #[test]
    fn unknown_name_defaults_to_smart_compression() {
        assert!("aggressive".parse::<CompactionStrategy>().is_err());
        assert_eq!(
            CompactionStrategy::from_name("aggressive"),
            CompactionStrategy::SmartCompression
        );
        assert_eq!(
            CompactionStrategy::from_name("clean_tools"),
            CompactionStrategy::CleanTools
        );
    }

    // ── Truncate ──

    #[test]
    fn truncate_keeps_system_and_drops_oldest() {
        let msgs = conversation(10, 20);
        let budget = estimate_tokens(&msgs) / 2;
        let out = truncate(&msgs, budget);

        assert_eq!(out[0], msgs[0]);
        assert!(estimate_tokens(&out) <= budget);
        assert_eq!(out.last(), msgs.last());
        assert!(is_subsequence(&out, &msgs));
    }

    #[test]
    fn truncate_tolerates_unsatisfiable_budget() {
        let msgs = conversation(3, 50);
        let out = truncate(&msgs, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], msgs[0]);
        assert_eq!(out[1], msgs[msgs.len() - 1]);
    }

    #[test]
    fn truncate_without_system_message() {
        let msgs = vec![
            Message::user("first question about Paris"),
            Message::assistant_text("first answer"),
            Message::user("second question about Rome"),
        ];
        let out = truncate(&msgs, 1);
        assert_eq!(out, vec![msgs[2].clone()]);
    }

    #[test]
    fn truncate_empty_is_empty() {
        assert!(truncate(&[], 10).is_empty());
    }

    #[test]
    fn truncate_never_opens_with_tool_result() {
        let mut msgs = vec![Message::system("sys"), Message::user("find hotels")];
        msgs.extend(tool_round("c1"));
        msgs.push(Message::assistant_text("Here are some hotels."));

        // Budget forces the assistant tool call out but the tool result would fit.
        let tail = estimate_tokens(&msgs[0..1]) + estimate_tokens(&msgs[3..]);
        let out = truncate(&msgs, tail);
        assert!(out.iter().skip(1).all(|m| m.role != MessageRole::Tool));
        assert_eq!(out.last(), msgs.last());
    }

    // ── Smart compression ──

    #[test]
    fn smart_compression_under_budget_is_identity() {
        let msgs = conversation(3, 2);
        assert_eq!(smart_compression(&msgs, usize::MAX), msgs);
    }

    #[test]
    fn smart_compression_keeps_last_five_turns() {
        let mut msgs = conversation(12, 5);
        msgs.extend(tool_round("c9"));
        let budget = estimate_tokens(&msgs) - 1;
        let out = smart_compression(&msgs, budget);

        let users = out.iter().filter(|m| m.role == MessageRole::User).count();
        assert_eq!(users, SMART_KEEP_TURNS);
        assert_eq!(out[0], msgs[0]);
        // Tool messages of the latest turn are retained.
        assert_eq!(out.last().unwrap().role, MessageRole::Tool);
        assert!(is_subsequence(&out, &msgs));
    }

    #[test]
    fn smart_compression_falls_back_to_truncate() {
        let msgs = conversation(8, 40);
        let budget = estimate_tokens(&msgs) / 10;
        let out = smart_compression(&msgs, budget);
        assert!(estimate_tokens(&out) <= budget || out.len() == 2);
        assert_eq!(out[0], msgs[0]);
    }

    // ── Summarize ──

    #[test]
    fn summarize_under_budget_is_identity() {
        let msgs = conversation(2, 2);
        assert_eq!(summarize(&msgs, usize::MAX), msgs);
    }

    #[test]
    fn summarize_inserts_summary_after_system() {
        // 60 turns = 120 conversation messages; 20 become "old".
        let msgs = conversation(60, 3);
        let total = estimate_tokens(&msgs);
        let out = summarize(&msgs, total - 1);

        assert_eq!(out[0], msgs[0]);
        assert_eq!(out[1].role, MessageRole::System);
        let summary = out[1].content.as_deref().unwrap();
        assert!(summary.starts_with("Previous conversation summary:"));
        assert!(summary.contains("User asked about: question 0"));
        assert!(summary.contains("Assistant provided info about hotels/travel."));
        assert!(estimate_tokens(&out) <= total - 1);
    }

    #[test]
    fn summarize_excerpts_are_bounded() {
        let long = "x".repeat(500);
        let mut msgs = vec![Message::system("sys"), Message::user(long.clone())];
        msgs.extend(conversation(60, 3).into_iter().skip(1));
        let out = summarize(&msgs, estimate_tokens(&msgs) - 1);
        let summary = out[1].content.as_deref().unwrap();
        assert!(summary.contains(&format!("User asked about: {}...", "x".repeat(100))));
        assert!(!summary.contains(&"x".repeat(101)));
    }

    #[test]
    fn summarize_never_grows_the_sequence() {
        let mut msgs = vec![Message::system("s")];
        for _ in 0..150 {
            msgs.push(Message::user("hi"));
        }
        let total = estimate_tokens(&msgs);
        let out = summarize(&msgs, total - 1);
        assert!(estimate_tokens(&out) <= total);
        assert_eq!(out[0], msgs[0]);
    }

    // ── Clean tool history ──

    #[test]
    fn clean_tools_drops_old_round_trips() {
        let mut msgs = vec![Message::system("sys"), Message::user("old question")];
        msgs.extend(tool_round("old"));
        msgs.push(Message::assistant_text("old answer"));
        msgs.extend(conversation(10, 1).into_iter().skip(1));

        let out = clean_tool_history(&msgs);
        assert!(out.iter().all(|m| m.tool_call_id.as_deref() != Some("old")));
        assert!(!out.iter().any(|m| m.has_tool_calls()));
        assert!(out.iter().any(|m| m.content.as_deref() == Some("old answer")));
        assert!(is_subsequence(&out, &msgs));
    }

    #[test]
    fn clean_tools_keeps_recent_window() {
        let mut msgs = vec![Message::system("sys")];
        for i in 0..5 {
            msgs.push(Message::user(format!("q{i}")));
            msgs.extend(tool_round(&format!("c{i}")));
        }
        // 16 messages, all inside the 20-message window.
        assert_eq!(clean_tool_history(&msgs), msgs);
    }

    #[test]
    fn clean_tools_removes_results_split_from_their_call() {
        let mut msgs = vec![Message::system("sys")];
        msgs.extend(conversation(9, 1).into_iter().skip(1));
        let [call, result] = tool_round("edge");
        msgs.push(call);
        msgs.push(result);
        msgs.extend(conversation(10, 1).into_iter().skip(2));
        // The call sits just outside the window, its result just inside.
        let out = clean_tool_history(&msgs);
        assert!(out.iter().all(|m| m.tool_call_id.as_deref() != Some("edge")));
    }

    // ── Shared invariants ──

    #[test]
    fn every_strategy_is_monotonic_and_order_preserving() {
        let mut msgs = conversation(30, 10);
        msgs.extend(tool_round("last"));
        let total = estimate_tokens(&msgs);
        for strategy in CompactionStrategy::ALL {
            for budget in [1, total / 4, total / 2, total - 1, total] {
                let out = strategy.compact(&msgs, budget);
                assert!(!out.is_empty(), "{strategy} emptied the sequence");
                assert!(estimate_tokens(&out) <= total, "{strategy} grew the sequence");
                assert!(
                    estimate_tokens(&out) <= budget || out.len() <= 2,
                    "{strategy} over budget {budget} with {} messages",
                    out.len()
                );
                if strategy != CompactionStrategy::Summarize {
                    assert!(is_subsequence(&out, &msgs), "{strategy} reordered");
                }
                assert_eq!(out[0], msgs[0], "{strategy} dropped the system message");
            }
        }
    }
}
