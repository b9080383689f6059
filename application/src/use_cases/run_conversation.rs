//! Conversation loop: one session's prompt → model → tools → model cycle.
//!
//! ```text
//!   submit(prompt)
//!        │
//!        ▼
//!   AwaitingModel ──content──▶ HasContent ──▶ Completed
//!        ▲    │
//!        │    └─tool calls──▶ HasToolCalls ──batch done──┐
//!        └───────────────────────────────────────────────┘
//!
//!   budget check fails before a request ──▶ BudgetExceeded
//!   session token fires anywhere          ──▶ Cancelled
//! ```
//!
//! The session owns its history exclusively. Tool-call and tool-result
//! entries of a turn are appended together after the batch finishes, so a
//! cancelled batch never leaves a dangling call entry.

use crate::config::ExecutionParams;
use crate::ports::conversation_recorder::{
    ConversationEvent, ConversationRecorder, NoConversationRecorder,
};
use crate::ports::model_gateway::{GatewayError, ModelGateway};
use crate::ports::session_observer::{NoSessionObserver, SessionObserver};
use crate::ports::tool_executor::ToolExecutorPort;
use crate::use_cases::execute_batch::ExecuteBatchUseCase;
use conch_domain::{BudgetExceeded, CallId, HistoryEntry, ToolCallRequest, TurnBudget};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No prompt in progress
    Idle,
    AwaitingModel,
    HasToolCalls,
    HasContent,
    Cancelled,
    BudgetExceeded,
}

/// How a submitted prompt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered with content after `turns` requests
    Completed { content: String, turns: usize },
    /// The session signal fired; no further history was appended
    Cancelled,
}

/// Errors that terminate a prompt
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(BudgetExceeded),

    #[error("Model request failed: {0}")]
    Gateway(#[from] GatewayError),
}

/// One interactive session's conversation state
pub struct ConversationSession<G, T>
where
    G: ModelGateway + ?Sized,
    T: ToolExecutorPort + ?Sized + 'static,
{
    session_id: String,
    gateway: Arc<G>,
    batch: ExecuteBatchUseCase<T>,
    observer: Arc<dyn SessionObserver>,
    recorder: Arc<dyn ConversationRecorder>,
    history: Vec<HistoryEntry>,
    budget: TurnBudget,
    state: LoopState,
}

impl<G, T> ConversationSession<G, T>
where
    G: ModelGateway + ?Sized,
    T: ToolExecutorPort + ?Sized + 'static,
{
    pub fn new(
        session_id: impl Into<String>,
        gateway: Arc<G>,
        batch: ExecuteBatchUseCase<T>,
        params: &ExecutionParams,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            gateway,
            batch,
            observer: Arc::new(NoSessionObserver),
            recorder: Arc::new(NoConversationRecorder),
            history: Vec::new(),
            budget: TurnBudget::new(params.max_turns, params.max_session_tokens),
            state: LoopState::Idle,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ConversationRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn budget(&self) -> &TurnBudget {
        &self.budget
    }

    pub fn batch(&self) -> &ExecuteBatchUseCase<T> {
        &self.batch
    }

    /// Drop the history (`/clear`). Session token usage is kept.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.state = LoopState::Idle;
        self.recorder.record(ConversationEvent::new(
            "history_cleared",
            json!({ "session_id": self.session_id }),
        ));
        info!(session = %self.session_id, "History cleared");
    }

    /// Run one user prompt until the model answers with content, the budget
    /// is exhausted, the backend fails or `cancellation` fires.
    pub async fn submit(
        &mut self,
        prompt: &str,
        cancellation: &CancellationToken,
    ) -> Result<TurnOutcome, ConversationError> {
        self.budget.reset_turns();
        self.append(HistoryEntry::user(prompt));

        loop {
            if let Err(exceeded) = self.budget.check() {
                return Err(self.budget_exceeded(exceeded));
            }
            if cancellation.is_cancelled() {
                return Ok(self.cancelled());
            }

            self.state = LoopState::AwaitingModel;
            let catalog = self.batch.executor().catalog();
            self.budget.record_turn();
            let turn_number = self.budget.turns();
            self.observer.on_model_request(turn_number);
            debug!(
                session = %self.session_id,
                turn = turn_number,
                history = self.history.len(),
                tools = catalog.len(),
                "Requesting model turn"
            );

            let response = tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                response = self.gateway.next_turn(&self.history, &catalog) => Some(response),
            };
            self.observer.on_model_response();
            let Some(response) = response else {
                return Ok(self.cancelled());
            };
            let turn = match response {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(session = %self.session_id, error = %e, "Model request failed");
                    self.state = LoopState::Idle;
                    self.recorder.record(ConversationEvent::new(
                        "model_error",
                        json!({ "session_id": self.session_id, "error": e.to_string() }),
                    ));
                    return Err(e.into());
                }
            };

            if let Some(usage) = turn.usage {
                self.budget.record_tokens(usage.total());
            }

            let content = turn.content.filter(|c| !c.trim().is_empty());

            if turn.tool_calls.is_empty() {
                self.state = LoopState::HasContent;
                let content = content.unwrap_or_default();
                self.observer.on_content(&content);
                self.append(HistoryEntry::assistant(content.clone()));
                self.state = LoopState::Idle;
                return Ok(TurnOutcome::Completed {
                    content,
                    turns: turn_number,
                });
            }

            self.state = LoopState::HasToolCalls;
            if let Some(text) = &content {
                self.observer.on_content(text);
            }
            let calls = rekey_call_ids(turn.tool_calls, turn_number);
            let results = self.batch.execute(&catalog, &calls, cancellation).await;

            if cancellation.is_cancelled() {
                return Ok(self.cancelled());
            }

            if let Some(text) = content {
                self.append(HistoryEntry::assistant(text));
            }
            self.append(HistoryEntry::tool_calls(calls));
            self.append(HistoryEntry::tool_results(results));
        }
    }

    fn append(&mut self, entry: HistoryEntry) {
        self.recorder
            .record(ConversationEvent::from_entry(&self.session_id, &entry));
        self.history.push(entry);
    }

    fn cancelled(&mut self) -> TurnOutcome {
        info!(session = %self.session_id, "Prompt cancelled");
        self.state = LoopState::Cancelled;
        self.observer.on_cancelled();
        self.recorder.record(ConversationEvent::new(
            "prompt_cancelled",
            json!({ "session_id": self.session_id, "turns": self.budget.turns() }),
        ));
        TurnOutcome::Cancelled
    }

    fn budget_exceeded(&mut self, exceeded: BudgetExceeded) -> ConversationError {
        warn!(session = %self.session_id, %exceeded, "Stopping prompt");
        self.state = LoopState::BudgetExceeded;
        self.observer.on_budget_exceeded(&exceeded);
        self.recorder.record(ConversationEvent::new(
            "budget_exceeded",
            json!({
                "session_id": self.session_id,
                "reason": exceeded.to_string(),
                "turns": self.budget.turns(),
                "tokens": self.budget.tokens(),
            }),
        ));
        ConversationError::BudgetExceeded(exceeded)
    }
}

/// Give every call in a turn a usable, unique id.
///
/// Backends occasionally omit ids or repeat them; results are correlated by
/// id, so missing or duplicate ones are replaced with `call_<turn>_<index>`.
fn rekey_call_ids(mut calls: Vec<ToolCallRequest>, turn: usize) -> Vec<ToolCallRequest> {
    let mut seen = HashSet::new();
    for (index, call) in calls.iter_mut().enumerate() {
        if call.call_id.is_empty() || !seen.insert(call.call_id.clone()) {
            let base = format!("call_{}_{}", turn, index);
            let mut id = CallId::new(base.clone());
            let mut suffix = 1;
            while !seen.insert(id.clone()) {
                id = CallId::new(format!("{}_{}", base, suffix));
                suffix += 1;
            }
            debug!(old = %call.call_id, new = %id, "Re-keyed tool call id");
            call.call_id = id;
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::confirmation::AutoApprove;
    use crate::use_cases::testing::{
        Behavior, LoopingGateway, RecordingObserver, ScriptedGateway, ScriptedTools, plain_tool,
        reply,
    };
    use conch_domain::{ModelTurn, TokenUsage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRecorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl ConversationRecorder for RecordingRecorder {
        fn record(&self, event: ConversationEvent) {
            self.events.lock().unwrap().push(event.event_type);
        }
    }

    fn session<G: ModelGateway>(
        gateway: Arc<G>,
        tools: Arc<ScriptedTools>,
        params: ExecutionParams,
    ) -> ConversationSession<G, ScriptedTools> {
        let batch = ExecuteBatchUseCase::new(
            tools,
            Arc::new(AutoApprove),
            Arc::new(NoSessionObserver),
        )
        .with_settings((&params).into());
        ConversationSession::new("test-session", gateway, batch, &params)
    }

    fn call(id: &str, tool: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, tool, serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_content_completes_prompt() {
        let gateway = Arc::new(ScriptedGateway::new(vec![ModelTurn::content("hello")]));
        let tools = Arc::new(ScriptedTools::new(vec![]));
        let observer = Arc::new(RecordingObserver::default());
        let mut s = session(gateway.clone(), tools, ExecutionParams::default())
            .with_observer(observer.clone());

        let outcome = s.submit("hi", &CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                content: "hello".to_string(),
                turns: 1
            }
        );
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.state(), LoopState::Idle);
        assert_eq!(*observer.contents.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_tool_turn_appends_calls_then_results() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelTurn::tool_calls(vec![call("1", "a"), call("2", "b")]),
            ModelTurn::content("done"),
        ]));
        let tools = Arc::new(ScriptedTools::new(vec![
            (plain_tool("a"), reply(0, "A")),
            (plain_tool("b"), reply(0, "B")),
        ]));
        let recorder = Arc::new(RecordingRecorder::default());
        let mut s = session(gateway.clone(), tools, ExecutionParams::default())
            .with_recorder(recorder.clone());

        let outcome = s.submit("go", &CancellationToken::new()).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed { turns: 2, .. }));
        let kinds: Vec<&str> = s.history().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["user_message", "tool_calls", "tool_results", "assistant_message"]
        );
        // the second request saw the call and result entries
        assert_eq!(gateway.seen_history_lens(), vec![1, 3]);
        assert_eq!(*recorder.events.lock().unwrap(), kinds);
    }

    #[tokio::test]
    async fn test_turn_budget_stops_after_exactly_n_requests() {
        let gateway = Arc::new(LoopingGateway {
            requests: AtomicUsize::new(0),
            tool_name: "a".to_string(),
        });
        let tools = Arc::new(ScriptedTools::new(vec![(plain_tool("a"), reply(0, "again"))]));
        let observer = Arc::new(RecordingObserver::default());
        let mut s = session(
            gateway.clone(),
            tools,
            ExecutionParams::default().with_max_turns(3),
        )
        .with_observer(observer.clone());

        let err = s.submit("loop", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            ConversationError::BudgetExceeded(BudgetExceeded::Turns { limit: 3 })
        ));
        assert_eq!(gateway.requests.load(Ordering::SeqCst), 3);
        assert_eq!(s.state(), LoopState::BudgetExceeded);
        assert_eq!(observer.budget_exceeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_turn_budget_resets_per_prompt() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelTurn::tool_calls(vec![call("1", "a")]),
            ModelTurn::content("first"),
            ModelTurn::tool_calls(vec![call("2", "a")]),
            ModelTurn::content("second"),
        ]));
        let tools = Arc::new(ScriptedTools::new(vec![(plain_tool("a"), reply(0, "A"))]));
        let mut s = session(gateway, tools, ExecutionParams::default().with_max_turns(2));
        let token = CancellationToken::new();

        assert!(s.submit("one", &token).await.is_ok());
        assert!(s.submit("two", &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_budget_checked_before_next_request() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelTurn::tool_calls(vec![call("1", "a")]).with_usage(TokenUsage {
                input_tokens: 8,
                output_tokens: 4,
            }),
            ModelTurn::content("unreachable"),
        ]));
        let tools = Arc::new(ScriptedTools::new(vec![(plain_tool("a"), reply(0, "A"))]));
        let mut s = session(
            gateway.clone(),
            tools,
            ExecutionParams::default().with_max_session_tokens(Some(10)),
        );

        let err = s.submit("go", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            ConversationError::BudgetExceeded(BudgetExceeded::Tokens { limit: 10, used: 12 })
        ));
        assert_eq!(gateway.requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_batch_and_skips_further_requests() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelTurn::tool_calls(vec![call("1", "sleep"), call("2", "plugin_tool")]),
            ModelTurn::content("never requested"),
        ]));
        let tools = Arc::new(ScriptedTools::new(vec![
            (plain_tool("sleep"), reply(5_000, "woke")),
            (plain_tool("plugin_tool"), Behavior::Hang),
        ]));
        let params = ExecutionParams::default().with_cancel_grace(Duration::from_millis(300));
        let observer = Arc::new(RecordingObserver::default());
        let mut s = session(gateway.clone(), tools, params).with_observer(observer.clone());

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let outcome = s.submit("work", &token).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(gateway.requests(), 1);
        // only the user prompt; no dangling call entry
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.state(), LoopState::Cancelled);
        assert_eq!(observer.cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_sends_nothing() {
        let gateway = Arc::new(ScriptedGateway::new(vec![ModelTurn::content("x")]));
        let mut s = session(
            gateway.clone(),
            Arc::new(ScriptedTools::new(vec![])),
            ExecutionParams::default(),
        );
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(s.submit("hi", &token).await.unwrap(), TurnOutcome::Cancelled);
        assert_eq!(gateway.requests(), 0);
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]).with_error("backend down"));
        let mut s = session(
            gateway,
            Arc::new(ScriptedTools::new(vec![])),
            ExecutionParams::default(),
        );

        let err = s.submit("hi", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ConversationError::Gateway(GatewayError::RequestFailed(_))));
        assert!(err.to_string().contains("backend down"));
        assert_eq!(s.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let gateway = Arc::new(ScriptedGateway::new(vec![ModelTurn::content("a")]));
        let mut s = session(
            gateway,
            Arc::new(ScriptedTools::new(vec![])),
            ExecutionParams::default(),
        );
        s.submit("hi", &CancellationToken::new()).await.unwrap();

        s.clear_history();

        assert!(s.history().is_empty());
    }

    #[test]
    fn test_rekey_missing_and_duplicate_ids() {
        let calls = vec![call("", "a"), call("x", "a"), call("x", "a"), call("  ", "a")];
        let ids: Vec<String> = rekey_call_ids(calls, 2)
            .into_iter()
            .map(|c| c.call_id.to_string())
            .collect();
        assert_eq!(ids, vec!["call_2_0", "x", "call_2_2", "call_2_3"]);
    }

    #[test]
    fn test_rekey_skips_ids_the_backend_already_used() {
        let calls = vec![call("call_1_1", "a"), call("", "a"), call("call_1_1_1", "a")];
        let ids: Vec<String> = rekey_call_ids(calls, 1)
            .into_iter()
            .map(|c| c.call_id.to_string())
            .collect();
        assert_eq!(ids, vec!["call_1_1", "call_1_1_1", "call_1_2"]);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}
