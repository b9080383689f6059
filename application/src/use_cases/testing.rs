//! Scripted test doubles shared by the use case tests.

use crate::ports::confirmation::{ConfirmationDecision, ConfirmationPort, ConfirmationRequest};
use crate::ports::model_gateway::{GatewayError, ModelGateway};
use crate::ports::session_observer::SessionObserver;
use crate::ports::tool_executor::ToolExecutorPort;
use async_trait::async_trait;
use conch_domain::{
    HistoryEntry, ModelTurn, ParamType, ParameterSpec, ToolCallRequest, ToolCallResult,
    ToolCatalog, ToolDescriptor, ToolOutcome, ValidatedArguments,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How a scripted tool behaves when executed
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Sleep, then succeed with the text; stops early on cancellation
    Reply { delay: Duration, text: String },
    /// Never finish and ignore cancellation (a misbehaving tool)
    Hang,
}

pub fn reply(delay_ms: u64, text: &str) -> Behavior {
    Behavior::Reply {
        delay: Duration::from_millis(delay_ms),
        text: text.to_string(),
    }
}

/// Tool executor whose tools follow scripted behaviors
pub struct ScriptedTools {
    catalog: Arc<ToolCatalog>,
    behaviors: HashMap<String, Behavior>,
    invoked: Mutex<Vec<String>>,
}

impl ScriptedTools {
    pub fn new(tools: Vec<(ToolDescriptor, Behavior)>) -> Self {
        let mut catalog = ToolCatalog::new();
        let mut behaviors = HashMap::new();
        for (descriptor, behavior) in tools {
            behaviors.insert(descriptor.name.clone(), behavior);
            catalog
                .push(Arc::new(descriptor))
                .expect("scripted tool names are unique");
        }
        Self {
            catalog: Arc::new(catalog),
            behaviors,
            invoked: Mutex::new(Vec::new()),
        }
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

/// A built-in tool taking one required string `path`
pub fn path_tool(name: &str) -> ToolDescriptor {
    ToolDescriptor::builtin(name, format!("{} tool", name))
        .with_parameter(ParameterSpec::required("path", "Path", ParamType::String))
}

/// A built-in tool without parameters
pub fn plain_tool(name: &str) -> ToolDescriptor {
    ToolDescriptor::builtin(name, format!("{} tool", name))
}

#[async_trait]
impl ToolExecutorPort for ScriptedTools {
    fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.catalog)
    }

    async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        _arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        self.invoked.lock().unwrap().push(descriptor.name.clone());
        match self.behaviors.get(&descriptor.name).cloned() {
            Some(Behavior::Reply { delay, text }) => {
                tokio::select! {
                    _ = cancellation.cancelled() => ToolOutcome::cancelled("cancelled"),
                    _ = tokio::time::sleep(delay) => ToolOutcome::success(text),
                }
            }
            Some(Behavior::Hang) => std::future::pending().await,
            None => ToolOutcome::execution_error("no behavior scripted"),
        }
    }
}

/// Model gateway returning scripted turns in order
pub struct ScriptedGateway {
    turns: Mutex<VecDeque<Result<ModelTurn, String>>>,
    requests: AtomicUsize,
    seen_history_lens: Mutex<Vec<usize>>,
}

impl ScriptedGateway {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
            requests: AtomicUsize::new(0),
            seen_history_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_error(self, message: &str) -> Self {
        self.turns
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn seen_history_lens(&self) -> Vec<usize> {
        self.seen_history_lens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn next_turn(
        &self,
        history: &[HistoryEntry],
        _catalog: &ToolCatalog,
    ) -> Result<ModelTurn, GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.seen_history_lens.lock().unwrap().push(history.len());
        match self.turns.lock().unwrap().pop_front() {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(GatewayError::RequestFailed(message)),
            None => Ok(ModelTurn::content("(script exhausted)")),
        }
    }
}

/// Gateway that repeats the same tool-call-only turn forever
pub struct LoopingGateway {
    pub requests: AtomicUsize,
    pub tool_name: String,
}

#[async_trait]
impl ModelGateway for LoopingGateway {
    async fn next_turn(
        &self,
        _history: &[HistoryEntry],
        _catalog: &ToolCatalog,
    ) -> Result<ModelTurn, GatewayError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(ModelTurn::tool_calls(vec![ToolCallRequest::new(
            format!("loop-{}", n).as_str(),
            self.tool_name.clone(),
            serde_json::json!({}),
        )]))
    }
}

/// Confirmation port that holds every request until released
pub struct GatedConfirmation {
    pub gate: Notify,
    pub decision: ConfirmationDecision,
    pub asked: AtomicUsize,
}

impl GatedConfirmation {
    pub fn new(decision: ConfirmationDecision) -> Self {
        Self {
            gate: Notify::new(),
            decision,
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConfirmationPort for GatedConfirmation {
    async fn confirm(&self, _request: ConfirmationRequest<'_>) -> ConfirmationDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.decision
    }
}

/// Confirmation port answering immediately with a fixed decision
pub struct CountingConfirmation {
    pub decision: ConfirmationDecision,
    pub asked: AtomicUsize,
}

impl CountingConfirmation {
    pub fn new(decision: ConfirmationDecision) -> Self {
        Self {
            decision,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationPort for CountingConfirmation {
    async fn confirm(&self, _request: ConfirmationRequest<'_>) -> ConfirmationDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

/// Observer recording tool results in completion order
#[derive(Default)]
pub struct RecordingObserver {
    pub completed: Mutex<Vec<String>>,
    pub contents: Mutex<Vec<String>>,
    pub cancelled: AtomicUsize,
    pub budget_exceeded: AtomicUsize,
}

impl RecordingObserver {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_content(&self, text: &str) {
        self.contents.lock().unwrap().push(text.to_string());
    }

    fn on_tool_result(&self, result: &ToolCallResult) {
        self.completed
            .lock()
            .unwrap()
            .push(result.call_id.as_str().to_string());
    }

    fn on_budget_exceeded(&self, _exceeded: &conch_domain::BudgetExceeded) {
        self.budget_exceeded.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}
