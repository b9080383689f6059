//! Execution orchestrator: runs the tool calls of one model turn.
//!
//! Every request in a batch goes through the same pipeline, concurrently
//! with its siblings:
//!
//! 1. Resolve the name against the turn's catalog snapshot
//!    (miss → `Error(ToolNotFound)`).
//! 2. Validate the arguments (failure → `Error(SchemaError)`, tool not invoked).
//! 3. If the call needs confirmation, wait for the user's decision. Only
//!    this call waits; auto-approved siblings run immediately. A denial
//!    maps to `Cancelled`.
//! 4. Dispatch through the [`ToolExecutorPort`] under the per-call timeout
//!    and the batch cancellation token.
//!
//! The batch completes when every request has a result, and results are
//! returned in request order regardless of completion order. One call's
//! error, timeout or denial never affects its siblings.

use crate::config::ExecutionParams;
use crate::ports::confirmation::{ConfirmationDecision, ConfirmationPort, ConfirmationRequest};
use crate::ports::session_observer::SessionObserver;
use crate::ports::tool_executor::ToolExecutorPort;
use crate::use_cases::shared::elapsed_ms;
use conch_domain::{
    ApprovalMode, ConfirmationPolicy, ErrorKind, NoPolicy, ToolCallRequest, ToolCallResult,
    ToolCatalog, ToolDescriptor, ToolOutcome, ValidatedArguments, requires_confirmation,
    validate,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing and approval settings for batch execution
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub tool_timeout: Duration,
    pub cancel_grace: Duration,
    pub approval_mode: ApprovalMode,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(120),
            cancel_grace: Duration::from_secs(2),
            approval_mode: ApprovalMode::Ask,
        }
    }
}

impl From<&ExecutionParams> for BatchSettings {
    fn from(params: &ExecutionParams) -> Self {
        Self {
            tool_timeout: params.tool_timeout,
            cancel_grace: params.cancel_grace,
            approval_mode: params.approval_mode,
        }
    }
}

/// Use case executing tool-call batches for one session.
///
/// Holds the session-scoped "approve always" set, so one instance must not
/// be shared between sessions.
pub struct ExecuteBatchUseCase<T: ToolExecutorPort + ?Sized + 'static> {
    executor: Arc<T>,
    confirmation: Arc<dyn ConfirmationPort>,
    policy: Arc<dyn ConfirmationPolicy>,
    observer: Arc<dyn SessionObserver>,
    settings: BatchSettings,
    always_allowed: Mutex<HashSet<String>>,
}

impl<T: ToolExecutorPort + ?Sized + 'static> ExecuteBatchUseCase<T> {
    pub fn new(
        executor: Arc<T>,
        confirmation: Arc<dyn ConfirmationPort>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            executor,
            confirmation,
            policy: Arc::new(NoPolicy),
            observer,
            settings: BatchSettings::default(),
            always_allowed: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ConfirmationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: BatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn executor(&self) -> &Arc<T> {
        &self.executor
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Tools the user approved for the rest of the session
    pub fn always_allowed(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .always_allowed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Execute every request, returning one result per request in request order.
    pub async fn execute(
        &self,
        catalog: &ToolCatalog,
        requests: &[ToolCallRequest],
        cancellation: &CancellationToken,
    ) -> Vec<ToolCallResult> {
        info!(calls = requests.len(), "Executing tool batch");

        let futures = requests
            .iter()
            .map(|request| self.run_call(catalog, request, cancellation));
        let results = futures::future::join_all(futures).await;

        debug_assert!(
            results
                .iter()
                .zip(requests)
                .all(|(result, request)| result.call_id == request.call_id)
        );
        results
    }

    async fn run_call(
        &self,
        catalog: &ToolCatalog,
        request: &ToolCallRequest,
        cancellation: &CancellationToken,
    ) -> ToolCallResult {
        let start = Instant::now();
        let outcome = self.resolve_and_run(catalog, request, cancellation).await;
        let result = ToolCallResult::new(request, outcome, elapsed_ms(start));

        debug!(
            tool = %request.tool_name,
            call_id = %request.call_id,
            duration_ms = result.duration_ms,
            success = result.outcome.is_success(),
            "Tool call finished"
        );
        self.observer.on_tool_result(&result);
        result
    }

    async fn resolve_and_run(
        &self,
        catalog: &ToolCatalog,
        request: &ToolCallRequest,
        cancellation: &CancellationToken,
    ) -> ToolOutcome {
        if cancellation.is_cancelled() {
            return ToolOutcome::cancelled("batch cancelled before the call started");
        }

        let Some(descriptor) = catalog.lookup(&request.tool_name) else {
            warn!(tool = %request.tool_name, "Model requested unknown tool");
            return ToolOutcome::error(
                ErrorKind::ToolNotFound,
                format!(
                    "unknown tool '{}'; available tools: {}",
                    request.tool_name,
                    catalog.names().join(", ")
                ),
            );
        };

        let arguments = match validate(descriptor, &request.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                debug!(tool = %request.tool_name, field = %e.field, "Schema validation failed");
                return ToolOutcome::error(ErrorKind::SchemaError, e.to_string());
            }
        };

        self.observer.on_tool_call(request);

        if self.needs_confirmation(descriptor, &arguments) {
            let decision = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return ToolOutcome::cancelled("batch cancelled while awaiting confirmation");
                }
                decision = self.confirmation.confirm(ConfirmationRequest { request, descriptor }) => decision,
            };
            match decision {
                ConfirmationDecision::Deny => {
                    info!(tool = %descriptor.name, "Tool call denied by user");
                    return ToolOutcome::cancelled("denied by user");
                }
                ConfirmationDecision::ApproveAlways => {
                    self.always_allowed
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(descriptor.name.clone());
                }
                ConfirmationDecision::Approve => {}
            }
        }

        self.dispatch(descriptor, arguments, cancellation).await
    }

    fn needs_confirmation(&self, descriptor: &ToolDescriptor, arguments: &ValidatedArguments) -> bool {
        if !requires_confirmation(
            descriptor,
            arguments,
            self.policy.as_ref(),
            self.settings.approval_mode,
        ) {
            return false;
        }
        !self
            .always_allowed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&descriptor.name)
    }

    /// Run an approved call under the timeout and cancellation discipline.
    ///
    /// Each call gets a child token. When the batch is cancelled or the
    /// timeout fires, the call has `cancel_grace` to wind down, after which
    /// its future is dropped (abandoned).
    async fn dispatch(
        &self,
        descriptor: &ToolDescriptor,
        arguments: ValidatedArguments,
        cancellation: &CancellationToken,
    ) -> ToolOutcome {
        let call_token = cancellation.child_token();
        let execution = self
            .executor
            .execute(descriptor, arguments, call_token.clone());
        tokio::pin!(execution);

        let grace = self.settings.cancel_grace;
        tokio::select! {
            biased;
            outcome = &mut execution => outcome,
            _ = cancellation.cancelled() => {
                if tokio::time::timeout(grace, &mut execution).await.is_err() {
                    warn!(tool = %descriptor.name, "Tool ignored cancellation; abandoning call");
                }
                ToolOutcome::cancelled("cancelled by user")
            }
            _ = tokio::time::sleep(self.settings.tool_timeout) => {
                call_token.cancel();
                if tokio::time::timeout(grace, &mut execution).await.is_err() {
                    warn!(tool = %descriptor.name, "Tool ignored timeout cancellation; abandoning call");
                }
                ToolOutcome::error(
                    ErrorKind::Timeout,
                    format!(
                        "tool '{}' did not finish within {} seconds",
                        descriptor.name,
                        self.settings.tool_timeout.as_secs_f64()
                    ),
                )
            }
        }
    }
}
