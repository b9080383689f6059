//! Session observer port.
//!
//! [`SessionObserver`] is an **output port** the presentation layer
//! implements to render the conversation as it happens. All methods have
//! default no-op implementations, so implementers only override the
//! callbacks they care about.

use conch_domain::{BudgetExceeded, CommandResult, ToolCallRequest, ToolCallResult};

pub trait SessionObserver: Send + Sync {
    /// Called right before a model request (`turn` is 1-based within the prompt)
    fn on_model_request(&self, _turn: usize) {}

    /// Called when the model request returns (successfully or not)
    fn on_model_response(&self) {}

    /// Called with assistant content, including text that accompanies tool calls
    fn on_content(&self, _text: &str) {}

    /// Called when a call in a batch starts (after validation, before approval)
    fn on_tool_call(&self, _request: &ToolCallRequest) {}

    /// Called as each call in a batch finishes, in completion order
    fn on_tool_result(&self, _result: &ToolCallResult) {}

    /// Called when the turn or token ceiling stops the loop
    fn on_budget_exceeded(&self, _exceeded: &BudgetExceeded) {}

    /// Called when the session signal cancels the current prompt
    fn on_cancelled(&self) {}

    /// Called with the output of a slash command
    fn on_command_result(&self, _result: &CommandResult) {}
}

/// No-op implementation for tests and headless runs.
pub struct NoSessionObserver;

impl SessionObserver for NoSessionObserver {}
