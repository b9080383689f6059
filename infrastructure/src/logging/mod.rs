//! Conversation recording.
//!
//! Provides [`JsonlConversationRecorder`], a JSONL file writer that implements
//! the [`ConversationRecorder`](conch_application::ConversationRecorder) port.

mod jsonl_recorder;

pub use jsonl_recorder::JsonlConversationRecorder;
