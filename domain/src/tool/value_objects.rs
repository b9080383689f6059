//! Tool call value objects: requests from the model and their results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier correlating a tool call request with its result
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is untrusted and unvalidated until it reaches the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: CallId,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<CallId>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Category of a failed tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Arguments did not match the tool's schema
    SchemaError,
    /// No tool with the requested name in the turn's catalog
    ToolNotFound,
    /// The plugin serving the tool is unreachable
    ConnectionError,
    /// The tool ran and failed
    ExecutionError,
    /// The call exceeded its deadline
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaError => "schema_error",
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a successful tool output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Output of a successful tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
    pub text: String,
    #[serde(default)]
    pub metadata: PayloadMetadata,
}

impl ToolPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: PayloadMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: PayloadMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Terminal outcome of a single tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(ToolPayload),
    Error { kind: ErrorKind, message: String },
    Cancelled { reason: String },
}

impl ToolOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        ToolOutcome::Success(ToolPayload::text(text))
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::ExecutionError, message)
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        ToolOutcome::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolOutcome::Cancelled { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ToolOutcome::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Text delivered to the model for this outcome.
    pub fn model_text(&self) -> String {
        match self {
            ToolOutcome::Success(payload) => payload.text.clone(),
            ToolOutcome::Error { kind, message } => format!("Error ({}): {}", kind, message),
            ToolOutcome::Cancelled { reason } => format!("Cancelled: {}", reason),
        }
    }
}

/// Result of one [`ToolCallRequest`], immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: CallId,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
}

impl ToolCallResult {
    pub fn new(request: &ToolCallRequest, outcome: ToolOutcome, duration_ms: u64) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            outcome,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_helpers() {
        assert!(ToolOutcome::success("ok").is_success());
        assert!(ToolOutcome::cancelled("user").is_cancelled());
        assert_eq!(
            ToolOutcome::error(ErrorKind::Timeout, "slow").error_kind(),
            Some(ErrorKind::Timeout)
        );
        assert_eq!(ToolOutcome::success("ok").error_kind(), None);
    }

    #[test]
    fn test_model_text() {
        let e = ToolOutcome::error(ErrorKind::SchemaError, "missing required field 'path'");
        assert_eq!(e.model_text(), "Error (schema_error): missing required field 'path'");
        assert_eq!(ToolOutcome::cancelled("denied").model_text(), "Cancelled: denied");
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let v = serde_json::to_value(ToolOutcome::error(ErrorKind::ToolNotFound, "nope")).unwrap();
        assert_eq!(v, json!({"status": "error", "kind": "tool_not_found", "message": "nope"}));
    }

    #[test]
    fn test_result_copies_request_identity() {
        let request = ToolCallRequest::new("c1", "read_file", json!({"path": "a"}));
        let result = ToolCallResult::new(&request, ToolOutcome::success("x"), 5);
        assert_eq!(result.call_id, CallId::new("c1"));
        assert_eq!(result.tool_name, "read_file");
    }
}
