//! Port for persisting the conversation.
//!
//! Defines the [`ConversationRecorder`] trait, an append-only feed of
//! history entries and session events. This is separate from
//! `tracing`-based operation logs: tracing handles human-readable
//! diagnostics, while this port captures the transcript in a
//! machine-readable format (JSONL).

use conch_domain::HistoryEntry;
use serde_json::Value;

/// A structured conversation event for recording.
pub struct ConversationEvent {
    /// Event type identifier (e.g., "user_message", "tool_results", "budget_exceeded").
    pub event_type: &'static str,
    /// JSON payload with event-specific data.
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    /// Event for a history entry appended by the conversation loop.
    pub fn from_entry(session_id: &str, entry: &HistoryEntry) -> Self {
        let mut payload = serde_json::to_value(entry).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut payload {
            map.insert("session_id".into(), Value::String(session_id.to_string()));
        }
        Self::new(entry.kind(), payload)
    }
}

/// Port for recording conversation events.
///
/// The `record` method is synchronous and non-fallible so persistence can
/// never disrupt the loop; implementations log their own write failures.
pub trait ConversationRecorder: Send + Sync {
    fn record(&self, event: ConversationEvent);
}

/// No-op implementation for tests and when recording is disabled.
pub struct NoConversationRecorder;

impl ConversationRecorder for NoConversationRecorder {
    fn record(&self, _event: ConversationEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_entry_adds_session_id() {
        let event = ConversationEvent::from_entry("s-1", &HistoryEntry::user("hello"));
        assert_eq!(event.event_type, "user_message");
        assert_eq!(event.payload["session_id"], "s-1");
        assert_eq!(event.payload["text"], "hello");
    }
}
