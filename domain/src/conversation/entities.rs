//! Conversation entities

use crate::tool::value_objects::{ToolCallRequest, ToolCallResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
            Role::Tool => f.write_str("tool"),
        }
    }
}

/// Payload of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryBody {
    Content { text: String },
    ToolCalls { calls: Vec<ToolCallRequest> },
    ToolResults { results: Vec<ToolCallResult> },
}

/// One element of the conversation sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    #[serde(flatten)]
    pub body: EntryBody,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: EntryBody::Content { text: text.into() },
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: EntryBody::Content { text: text.into() },
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            body: EntryBody::ToolCalls { calls },
        }
    }

    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self {
            role: Role::Tool,
            body: EntryBody::ToolResults { results },
        }
    }

    /// Short tag used in logs and recordings
    pub fn kind(&self) -> &'static str {
        match self.body {
            EntryBody::Content { .. } => match self.role {
                Role::User => "user_message",
                _ => "assistant_message",
            },
            EntryBody::ToolCalls { .. } => "tool_calls",
            EntryBody::ToolResults { .. } => "tool_results",
        }
    }
}

/// Token accounting reported by the model backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One response from the model backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTurn {
    /// Natural-language content (may accompany tool calls)
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ModelTurn {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::value_objects::{ToolCallRequest, ToolCallResult, ToolOutcome};
    use serde_json::json;

    #[test]
    fn test_entry_kinds() {
        assert_eq!(HistoryEntry::user("hi").kind(), "user_message");
        assert_eq!(HistoryEntry::assistant("hello").kind(), "assistant_message");
        assert_eq!(HistoryEntry::tool_calls(vec![]).kind(), "tool_calls");
        assert_eq!(HistoryEntry::tool_results(vec![]).kind(), "tool_results");
    }

    #[test]
    fn test_entry_serializes_flat() {
        let v = serde_json::to_value(HistoryEntry::user("hi")).unwrap();
        assert_eq!(v, json!({"role": "user", "kind": "content", "text": "hi"}));
    }

    #[test]
    fn test_tool_results_entry_roundtrip() {
        let request = ToolCallRequest::new("c1", "read_file", json!({"path": "a"}));
        let entry = HistoryEntry::tool_results(vec![ToolCallResult::new(
            &request,
            ToolOutcome::success("data"),
            3,
        )]);
        let back: HistoryEntry =
            serde_json::from_value(serde_json::to_value(&entry).unwrap()).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_model_turn_deserializes_sparse() {
        let turn: ModelTurn = serde_json::from_value(json!({"content": "done"})).unwrap();
        assert!(!turn.has_tool_calls());
        assert_eq!(turn.content.as_deref(), Some("done"));
    }
}
