//! Confirmation port
//!
//! The UI collaborator answers approval requests for calls flagged as
//! requiring confirmation. Each flagged call awaits its own decision; other
//! calls in the batch are not held back.

use async_trait::async_trait;
use conch_domain::{ToolCallRequest, ToolDescriptor};

/// User's answer to a confirmation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approve,
    /// Approve this call and every later call of the same tool this session
    ApproveAlways,
    Deny,
}

impl ConfirmationDecision {
    pub fn is_approved(&self) -> bool {
        !matches!(self, ConfirmationDecision::Deny)
    }
}

/// Context shown to the user when asking for approval
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationRequest<'a> {
    pub request: &'a ToolCallRequest,
    pub descriptor: &'a ToolDescriptor,
}

#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    async fn confirm(&self, request: ConfirmationRequest<'_>) -> ConfirmationDecision;
}

/// Approves everything (non-interactive runs and tests)
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPort for AutoApprove {
    async fn confirm(&self, _request: ConfirmationRequest<'_>) -> ConfirmationDecision {
        ConfirmationDecision::Approve
    }
}
