//! The turn loop: user message in, final reply out.
//!
//! [`ChatEngine::handle_turn`] runs one conversation turn as a bounded state
//! machine:
//!
//! 1. Load (or create) the conversation, append the user message, compact it
//!    to budget, persist it, and evict old conversations if the store is over
//!    capacity.
//! 2. Call the model. A final text answer is appended, compacted, persisted
//!    and returned.
//! 3. A tool-call batch is appended and dispatched in request order. The
//!    first result that short-circuits becomes the reply and ends the turn;
//!    calls after it are never made. Otherwise the results go back to the
//!    model for another round trip.
//! 4. A failed model call truncates the conversation to a halved budget and
//!    retries. Failing again with only the system and user messages left, or
//!    failing more than `max_model_failures` times, ends the turn with
//!    [`ChatError::Model`].
//!
//! Turns on the same conversation id are serialized through the store's
//! per-id lock.

use super::config::ChatConfig;
use super::session::SessionStore;
use super::short_circuit::ShortCircuit;
use crate::api::{ChatModel, ModelError, ModelReply};
use crate::context::{CompactionStrategy, ContextManager};
use crate::tools::{ToolDispatcher, truncate_result};
use crate::{Message, ToolCall, ToolDef};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a turn produced no reply.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The model kept failing after recompaction.
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
    /// The model kept requesting tools past the per-turn ceiling.
    #[error("turn exceeded {limit} model round trips")]
    RoundTripLimit { limit: usize },
    /// The caller's deadline passed before the turn finished.
    #[error("turn timed out after {0:?}")]
    Timeout(Duration),
}

/// A completed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub reply: String,
    pub conversation_id: String,
}

/// Everything a turn needs, passed explicitly rather than held in globals.
pub struct ChatContext {
    pub model: Arc<dyn ChatModel>,
    pub tools: ToolDispatcher,
    pub short_circuits: Box<dyn ShortCircuit>,
    pub store: SessionStore,
    pub config: ChatConfig,
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext")
            .field("tools", &self.tools)
            .field("store", &self.store.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatContext {
    /// Bundle the collaborators with a fresh store seeded from
    /// `config.system_prompt`.
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolDispatcher,
        short_circuits: impl ShortCircuit + 'static,
        config: ChatConfig,
    ) -> Self {
        Self {
            model,
            tools,
            short_circuits: Box::new(short_circuits),
            store: SessionStore::new(config.system_prompt.clone()),
            config,
        }
    }
}

/// Drives conversation turns against a [`ChatContext`].
#[derive(Debug)]
pub struct ChatEngine {
    ctx: ChatContext,
    tool_defs: Vec<ToolDef>,
    context: ContextManager,
}

/// Where a tool batch left the turn.
enum BatchOutcome {
    ShortCircuit(String),
    Continue,
}

impl ChatEngine {
    pub fn new(ctx: ChatContext) -> Self {
        let tool_defs = ctx.tools.definitions();
        let context = ContextManager::new()
            .with_strategy(ctx.config.strategy)
            .with_max_tokens(ctx.config.max_context_tokens);
        Self {
            ctx,
            tool_defs,
            context,
        }
    }

    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }

    pub fn store(&self) -> &SessionStore {
        &self.ctx.store
    }

    pub fn config(&self) -> &ChatConfig {
        &self.ctx.config
    }

    /// Run one turn. A missing or empty `conversation_id` starts a new
    /// conversation under a fresh UUID.
    pub async fn handle_turn(
        &self,
        conversation_id: Option<String>,
        user_message: impl Into<String>,
    ) -> Result<TurnReply, ChatError> {
        let id = conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = self.ctx.store.lock(&id).await;
        let start = Instant::now();
        info!("Turn started for conversation {id}");

        let config = &self.ctx.config;
        let mut messages = self.ctx.store.get_or_create(&id);
        messages.push(Message::user(user_message));
        messages = self.compact(messages);
        self.ctx.store.put(&id, messages.clone());
        self.ctx.store.maybe_evict(
            config.max_conversations,
            config.target_conversations,
            config.eviction_policy,
        );

        let mut round_trips = 0;
        let mut failures = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            if round_trips >= config.max_round_trips {
                warn!(
                    "Conversation {id} hit the round-trip ceiling ({})",
                    config.max_round_trips
                );
                return Err(ChatError::RoundTripLimit {
                    limit: config.max_round_trips,
                });
            }
            round_trips += 1;
            debug!("Conversation {id}: model call {round_trips}");

            let outcome = self.ctx.model.complete(&messages, &self.tool_defs).await;
            let reply = match outcome {
                Ok(reply) => {
                    consecutive_failures = 0;
                    reply
                }
                Err(e) => {
                    failures += 1;
                    consecutive_failures += 1;
                    error!("Model call failed for conversation {id} (failure {failures}): {e}");

                    let minimal = messages.len() <= 2;
                    if failures > config.max_model_failures
                        || (consecutive_failures >= 2 && minimal)
                    {
                        return Err(ChatError::Model(e));
                    }

                    let budget = config
                        .max_context_tokens
                        .checked_shr(consecutive_failures)
                        .unwrap_or(0);
                    let before = messages.len();
                    messages = self
                        .context
                        .with_strategy(CompactionStrategy::Truncate)
                        .with_max_tokens(budget)
                        .manage(messages);
                    warn!(
                        "Recovering conversation {id}: truncated to {budget} tokens ({before} -> {} messages)",
                        messages.len()
                    );
                    self.ctx.store.put(&id, messages.clone());
                    continue;
                }
            };

            match reply {
                ModelReply::FinalText(text) => {
                    return Ok(self.finish(id, messages, text, round_trips, start));
                }
                ModelReply::ToolCalls(calls) => {
                    info!("Conversation {id}: {} tool call(s)", calls.len());
                    match self.run_tool_batch(&mut messages, calls).await {
                        BatchOutcome::ShortCircuit(text) => {
                            return Ok(self.finish(id, messages, text, round_trips, start));
                        }
                        BatchOutcome::Continue => {
                            messages = self.compact(messages);
                        }
                    }
                }
            }
        }
    }

    /// [`handle_turn`](Self::handle_turn) bounded by `timeout`.
    pub async fn handle_turn_with_timeout(
        &self,
        conversation_id: Option<String>,
        user_message: impl Into<String>,
        timeout: Duration,
    ) -> Result<TurnReply, ChatError> {
        tokio::time::timeout(timeout, self.handle_turn(conversation_id, user_message))
            .await
            .map_err(|_| {
                warn!("Turn timed out after {timeout:?}");
                ChatError::Timeout(timeout)
            })?
    }

    /// Append the final answer, compact, persist.
    fn finish(
        &self,
        id: String,
        mut messages: Vec<Message>,
        reply: String,
        round_trips: usize,
        start: Instant,
    ) -> TurnReply {
        messages.push(Message::assistant_text(reply.clone()));
        messages = self.compact(messages);
        self.ctx.store.put(&id, messages);
        info!(
            "Turn finished for conversation {id}: {round_trips} model call(s) in {:.1}s",
            start.elapsed().as_secs_f64()
        );
        TurnReply {
            reply,
            conversation_id: id,
        }
    }

    fn compact(&self, messages: Vec<Message>) -> Vec<Message> {
        let messages = self.context.manage(messages);
        debug!(
            "Context at {:.0}% of {} tokens",
            self.context.usage_percent(&messages),
            self.context.max_tokens()
        );
        messages
    }

    /// Dispatch a batch and append its results in request order.
    ///
    /// On a short circuit, the assistant message keeps only the calls that
    /// actually ran so every stored tool call has its result.
    async fn run_tool_batch(
        &self,
        messages: &mut Vec<Message>,
        calls: Vec<ToolCall>,
    ) -> BatchOutcome {
        let assistant_at = messages.len();
        messages.push(Message::assistant_tool_calls(calls.clone()));
        let max_chars = self.ctx.config.max_tool_result_chars;

        if self.ctx.config.parallel_tool_dispatch {
            let results = futures::future::join_all(
                calls
                    .iter()
                    .map(|call| self.ctx.tools.dispatch(call.name(), &call.function.arguments)),
            )
            .await;
            for (i, (call, result)) in calls.iter().zip(results).enumerate() {
                let content = truncate_result(&result, max_chars);
                messages.push(Message::tool_result(&call.id, content));
                if let Some(reply) = self.ctx.short_circuits.resolve(call.name(), &result) {
                    keep_calls(&mut messages[assistant_at], i + 1);
                    return BatchOutcome::ShortCircuit(reply);
                }
            }
        } else {
            for (i, call) in calls.iter().enumerate() {
                let result = self
                    .ctx
                    .tools
                    .dispatch(call.name(), &call.function.arguments)
                    .await;
                let content = truncate_result(&result, max_chars);
                messages.push(Message::tool_result(&call.id, content));
                if let Some(reply) = self.ctx.short_circuits.resolve(call.name(), &result) {
                    keep_calls(&mut messages[assistant_at], i + 1);
                    return BatchOutcome::ShortCircuit(reply);
                }
            }
        }
        BatchOutcome::Continue
    }
}

/// Drop tool calls after the first `count` from an assistant message.
fn keep_calls(message: &mut Message, count: usize) {
    if let Some(ref mut calls) = message.tool_calls
        && calls.len() > count
    {
        debug!("Skipping {} tool call(s) after short circuit", calls.len() - count);
        calls.truncate(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageRole;
    use crate::agent::short_circuit::ShortCircuitTable;
    use crate::api::ModelFuture;
    use crate::tools::catalog::{
        CHECK_AVAILABILITY, GET_FULL_HOTEL_DETAILS, PropertyArgs, SEARCH_HOTELS, SearchHotelsArgs,
        get_full_hotel_details_def, search_hotels_def,
    };
    use crate::tools::{FnTool, ToolError};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Fakes ──

    /// Replays a fixed script of replies; fails once the script runs out.
    struct ScriptedModel {
        script: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Result<ModelReply, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatModel for ScriptedModel {
        fn complete<'a>(
            &'a self,
            messages: &'a [Message],
            _tools: &'a [ToolDef],
        ) -> ModelFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::Transport("script exhausted".into())));
            Box::pin(async move { next })
        }
    }

    /// Always asks for the same tool call.
    struct LoopingModel;

    impl ChatModel for LoopingModel {
        fn complete<'a>(
            &'a self,
            _messages: &'a [Message],
            _tools: &'a [ToolDef],
        ) -> ModelFuture<'a> {
            Box::pin(async {
                Ok(ModelReply::ToolCalls(vec![details_call("loop")]))
            })
        }
    }

    /// Never answers in time.
    struct SlowModel;

    impl ChatModel for SlowModel {
        fn complete<'a>(
            &'a self,
            _messages: &'a [Message],
            _tools: &'a [ToolDef],
        ) -> ModelFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(ModelReply::FinalText("too late".into()))
            })
        }
    }

    fn search_call(id: &str) -> ToolCall {
        ToolCall::new(id, SEARCH_HOTELS, r#"{"preference_text":"quiet hotel with gym"}"#)
    }

    fn details_call(id: &str) -> ToolCall {
        ToolCall::new(id, GET_FULL_HOTEL_DETAILS, r#"{"property_id":"123"}"#)
    }

    struct Counters {
        search: Arc<AtomicUsize>,
        details: Arc<AtomicUsize>,
    }

    fn travel_tools(search_delay: Duration) -> (ToolDispatcher, Counters) {
        let counters = Counters {
            search: Arc::new(AtomicUsize::new(0)),
            details: Arc::new(AtomicUsize::new(0)),
        };
        let search = counters.search.clone();
        let details = counters.details.clone();
        let tools = ToolDispatcher::new()
            .with(FnTool::new(search_hotels_def(), move |_: SearchHotelsArgs| {
                search.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(search_delay).await;
                    Ok::<_, ToolError>(json!([{
                        "name": "Hotel Adlon",
                        "rank": 1,
                        "rating": 5,
                        "location": {"city": "Berlin"}
                    }]))
                }
            }))
            .with(FnTool::new(get_full_hotel_details_def(), move |args: PropertyArgs| {
                details.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, ToolError>(json!({
                        "property_id": args.property_id,
                        "rooms": [{"rate": "180 EUR"}]
                    }))
                }
            }))
            .with_travel_catalog();
        (tools, counters)
    }

    fn engine_with(
        model: Arc<dyn ChatModel>,
        tools: ToolDispatcher,
        config: ChatConfig,
    ) -> ChatEngine {
        ChatEngine::new(ChatContext::new(
            model,
            tools,
            ShortCircuitTable::travel(),
            config.with_system_prompt("You are a travel assistant."),
        ))
    }

    // ── Final text ──

    #[tokio::test]
    async fn final_text_is_returned_and_persisted() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::FinalText("Where to?".into()))]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());

        let reply = engine.handle_turn(None, "I need a hotel").await.unwrap();
        assert_eq!(reply.reply, "Where to?");
        assert!(Uuid::parse_str(&reply.conversation_id).is_ok());

        let stored = engine.store().get(&reply.conversation_id).unwrap();
        assert_eq!(
            stored,
            vec![
                Message::system("You are a travel assistant."),
                Message::user("I need a hotel"),
                Message::assistant_text("Where to?"),
            ]
        );
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn existing_conversation_continues() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::FinalText("Where to?".into())),
            Ok(ModelReply::FinalText("Berlin, noted.".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());

        let first = engine.handle_turn(Some("conv-1".into()), "Hi").await.unwrap();
        let second = engine
            .handle_turn(Some(first.conversation_id.clone()), "Berlin")
            .await
            .unwrap();
        assert_eq!(second.conversation_id, "conv-1");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][3], Message::user("Berlin"));
    }

    #[tokio::test]
    async fn empty_id_starts_new_conversation() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::FinalText("Hello".into()))]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model, tools, ChatConfig::default());
        let reply = engine.handle_turn(Some(String::new()), "Hi").await.unwrap();
        assert!(!reply.conversation_id.is_empty());
    }

    // ── Tool calls ──

    #[tokio::test]
    async fn first_short_circuit_wins() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::ToolCalls(vec![
            search_call("c1"),
            details_call("c2"),
        ]))]);
        let (tools, counters) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());

        let reply = engine.handle_turn(Some("t".into()), "Find hotels").await.unwrap();
        assert!(reply.reply.contains("Hotel Adlon"));
        assert_eq!(counters.search.load(Ordering::SeqCst), 1);
        assert_eq!(counters.details.load(Ordering::SeqCst), 0);
        assert_eq!(model.calls(), 1);

        let stored = engine.store().get("t").unwrap();
        let roles: Vec<MessageRole> = stored.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant,
            ]
        );
        assert_eq!(stored[2].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(stored[3].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn tool_results_feed_the_next_round_trip() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![details_call("c1")])),
            Ok(ModelReply::FinalText("A double room is 180 EUR.".into())),
        ]);
        let (tools, counters) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());

        let reply = engine.handle_turn(None, "Is it available?").await.unwrap();
        assert_eq!(reply.reply, "A double room is 180 EUR.");
        assert_eq!(counters.details.load(Ordering::SeqCst), 1);

        let seen = model.seen.lock().unwrap();
        let tool_msg = seen[1].last().unwrap();
        assert_eq!(tool_msg.role, MessageRole::Tool);
        assert!(tool_msg.content.as_deref().unwrap().contains("180 EUR"));
    }

    #[tokio::test]
    async fn tool_results_are_truncated() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![details_call("c1")])),
            Ok(ModelReply::FinalText("ok".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(
            model.clone(),
            tools,
            ChatConfig::default().with_max_tool_result_chars(12),
        );
        engine.handle_turn(None, "check").await.unwrap();

        let seen = model.seen.lock().unwrap();
        let content = seen[1].last().unwrap().content.clone().unwrap();
        assert_eq!(content.chars().count(), 12);
    }

    #[tokio::test]
    async fn unknown_tools_are_reported_to_the_model() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![ToolCall::new("c1", "book_flight", "{}")])),
            Ok(ModelReply::FinalText("I can only help with hotels.".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());
        engine.handle_turn(None, "Book me a flight").await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(
            seen[1].last().unwrap().content.as_deref(),
            Some(r#"{"error":"Unknown function"}"#)
        );
    }

    #[tokio::test]
    async fn parallel_dispatch_keeps_request_order() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![
                details_call("c1"),
                ToolCall::new("c2", "mapbox_search", r#"{"query":"Berlin"}"#),
            ])),
            Ok(ModelReply::FinalText("done".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(
            model.clone(),
            tools,
            ChatConfig::default().with_parallel_tool_dispatch(true),
        );
        engine.handle_turn(None, "plan").await.unwrap();

        let seen = model.seen.lock().unwrap();
        let ids: Vec<_> = seen[1]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn parallel_short_circuit_is_decided_in_request_order() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::ToolCalls(vec![
            search_call("slow"),
            details_call("fast"),
        ]))]);
        // The search finishes last but is first in the batch.
        let (tools, counters) = travel_tools(Duration::from_millis(30));
        let engine = engine_with(
            model,
            tools,
            ChatConfig::default().with_parallel_tool_dispatch(true),
        );
        let reply = engine.handle_turn(Some("p".into()), "hotels").await.unwrap();
        assert!(reply.reply.contains("Hotel Adlon"));
        // Unlike sequential mode, the call after the short circuit still ran.
        assert_eq!(counters.details.load(Ordering::SeqCst), 1);

        let stored = engine.store().get("p").unwrap();
        assert!(stored.iter().all(|m| m.tool_call_id.as_deref() != Some("fast")));
    }

    #[tokio::test]
    async fn availability_results_end_the_turn() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::ToolCalls(vec![ToolCall::new(
            "c1",
            CHECK_AVAILABILITY,
            r#"{"in_date":"2026-11-02","out_date":"2026-11-05","property_id":"123"}"#,
        )]))]);
        let tools = ToolDispatcher::new().with(FnTool::new(
            crate::tools::catalog::check_availability_def(),
            |_: crate::tools::catalog::CheckAvailabilityArgs| async {
                Ok::<_, ToolError>(json!({"availability": [{"rates": [
                    {"room_description": "Double Room", "total_price": 180.0, "currency": "EUR"}
                ]}]}))
            },
        ));
        let engine = engine_with(model.clone(), tools, ChatConfig::default());

        let reply = engine.handle_turn(None, "Is it free?").await.unwrap();
        assert!(reply.reply.contains("Double Room"));
        assert_eq!(model.calls(), 1);
    }

    // ── Bounds and recovery ──

    #[tokio::test]
    async fn round_trips_are_bounded() {
        let (tools, counters) = travel_tools(Duration::ZERO);
        let engine = engine_with(
            Arc::new(LoopingModel),
            tools,
            ChatConfig::default().with_max_round_trips(3),
        );
        let err = engine.handle_turn(None, "loop").await.unwrap_err();
        assert!(matches!(err, ChatError::RoundTripLimit { limit: 3 }));
        assert_eq!(counters.details.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn second_failure_on_minimal_context_propagates() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Transport("connection reset".into())),
            Err(ModelError::Status {
                status: 400,
                body: "context_length_exceeded".into(),
            }),
            Ok(ModelReply::FinalText("unreachable".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());

        let err = engine.handle_turn(Some("r".into()), "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(ModelError::Status { status: 400, .. })));
        assert_eq!(model.calls(), 2);

        let stored = engine.store().get("r").unwrap();
        assert!(stored.iter().all(|m| m.role != MessageRole::Assistant));
    }

    #[tokio::test]
    async fn single_failure_is_recovered() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Status {
                status: 503,
                body: "overloaded".into(),
            }),
            Ok(ModelReply::FinalText("Recovered".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model.clone(), tools, ChatConfig::default());
        let reply = engine.handle_turn(None, "hello").await.unwrap();
        assert_eq!(reply.reply, "Recovered");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn recovery_truncates_long_conversations() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Status {
                status: 400,
                body: "context_length_exceeded".into(),
            }),
            Ok(ModelReply::FinalText("ok".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let mut history = vec![Message::system("You are a travel assistant.")];
        for i in 0..30 {
            history.push(Message::user(format!("question {i} about hotels in Lisbon")));
            history.push(Message::assistant_text(format!("answer {i} about Lisbon hotels")));
        }
        let budget = crate::context::estimate_tokens(&history) + 100;
        let engine = engine_with(
            model.clone(),
            tools,
            ChatConfig::default().with_max_context_tokens(budget),
        );
        engine.store().put("long", history.clone());

        engine.handle_turn(Some("long".into()), "and now?").await.unwrap();
        let seen = model.seen.lock().unwrap();
        assert!(seen[1].len() < seen[0].len());
        assert!(crate::context::estimate_tokens(&seen[1]) <= budget / 2);
        assert_eq!(seen[1][0], history[0]);
    }

    #[tokio::test]
    async fn turns_compact_with_the_configured_strategy() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::FinalText("ok".into()))]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let mut history = vec![Message::system("You are a travel assistant.")];
        for i in 0..30 {
            history.push(Message::user(format!("question {i} about hotels in Porto")));
            history.push(Message::assistant_text(format!("answer {i} about Porto hotels")));
        }
        let budget = crate::context::estimate_tokens(&history) / 3;
        let engine = engine_with(
            model.clone(),
            tools,
            ChatConfig::default()
                .with_strategy(CompactionStrategy::Truncate)
                .with_max_context_tokens(budget),
        );
        engine.store().put("porto", history.clone());

        engine.handle_turn(Some("porto".into()), "and now?").await.unwrap();
        let seen = model.seen.lock().unwrap();
        assert!(crate::context::estimate_tokens(&seen[0]) <= budget);
        assert_eq!(seen[0][0], history[0]);
        assert_eq!(seen[0].last(), Some(&Message::user("and now?")));

        let stored = engine.store().get("porto").unwrap();
        assert!(crate::context::estimate_tokens(&stored) <= budget);
        assert_eq!(stored.last(), Some(&Message::assistant_text("ok")));
    }

    #[tokio::test]
    async fn failures_are_capped() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Empty),
            Ok(ModelReply::ToolCalls(vec![details_call("a")])),
            Err(ModelError::Empty),
            Ok(ModelReply::ToolCalls(vec![details_call("b")])),
            Err(ModelError::Empty),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(
            model.clone(),
            tools,
            ChatConfig::default().with_max_model_failures(2),
        );
        let err = engine.handle_turn(None, "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(ModelError::Empty)));
        assert_eq!(model.calls(), 5);
    }

    #[tokio::test]
    async fn turns_can_time_out() {
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(Arc::new(SlowModel), tools, ChatConfig::default());
        let err = engine
            .handle_turn_with_timeout(None, "hello", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
    }

    // ── Store interaction ──

    #[tokio::test]
    async fn turns_trigger_eviction() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::FinalText("1".into())),
            Ok(ModelReply::FinalText("2".into())),
            Ok(ModelReply::FinalText("3".into())),
        ]);
        let (tools, _) = travel_tools(Duration::ZERO);
        let engine = engine_with(model, tools, ChatConfig::default().with_capacity(2, 1));
        for id in ["a", "b", "c"] {
            engine.handle_turn(Some(id.into()), "hi").await.unwrap();
        }
        assert_eq!(engine.store().ids(), vec!["c"]);
    }
}
