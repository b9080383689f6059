//! Execution parameters for the conversation loop and orchestrator control.
//!
//! [`ExecutionParams`] groups the static parameters that bound the
//! [`ConversationSession`](crate::use_cases::run_conversation::ConversationSession)
//! loop and the [`ExecuteBatchUseCase`](crate::use_cases::execute_batch::ExecuteBatchUseCase).
//! These are application-layer concerns, not domain policy.

use conch_domain::ApprovalMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution loop control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Maximum model requests while answering one user prompt.
    pub max_turns: usize,
    /// Maximum total tokens for the whole session, when the backend reports usage.
    pub max_session_tokens: Option<u64>,
    /// Deadline for a single tool call (after approval).
    pub tool_timeout: Duration,
    /// How long cancelled calls get to wind down before they are abandoned.
    pub cancel_grace: Duration,
    /// Session-wide confirmation behaviour.
    pub approval_mode: ApprovalMode,
    /// Working directory reported to commands and tools.
    pub working_dir: Option<String>,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_session_tokens: None,
            tool_timeout: Duration::from_secs(120),
            cancel_grace: Duration::from_secs(2),
            approval_mode: ApprovalMode::Ask,
            working_dir: None,
        }
    }
}

impl ExecutionParams {
    // ==================== Builder Methods ====================

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_max_session_tokens(mut self, max: Option<u64>) -> Self {
        self.max_session_tokens = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = ExecutionParams::default();
        assert_eq!(params.max_turns, 25);
        assert!(params.max_session_tokens.is_none());
        assert_eq!(params.tool_timeout, Duration::from_secs(120));
        assert_eq!(params.cancel_grace, Duration::from_secs(2));
        assert_eq!(params.approval_mode, ApprovalMode::Ask);
        assert!(params.working_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let params = ExecutionParams::default()
            .with_max_turns(3)
            .with_max_session_tokens(Some(10_000))
            .with_approval_mode(ApprovalMode::Yolo)
            .with_working_dir("/tmp/test");

        assert_eq!(params.max_turns, 3);
        assert_eq!(params.max_session_tokens, Some(10_000));
        assert_eq!(params.approval_mode, ApprovalMode::Yolo);
        assert_eq!(params.working_dir, Some("/tmp/test".to_string()));
    }
}
