//! Application layer for conch
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::ExecutionParams;
pub use ports::{
    command_source::{CommandLoad, CommandSource},
    confirmation::{AutoApprove, ConfirmationDecision, ConfirmationPort, ConfirmationRequest},
    conversation_recorder::{ConversationEvent, ConversationRecorder, NoConversationRecorder},
    model_gateway::{GatewayError, ModelGateway},
    session_observer::{NoSessionObserver, SessionObserver},
    tool_executor::ToolExecutorPort,
};
pub use use_cases::dispatch_command::{CommandDispatcher, DispatchOutcome};
pub use use_cases::execute_batch::{BatchSettings, ExecuteBatchUseCase};
pub use use_cases::run_conversation::{
    ConversationError, ConversationSession, LoopState, TurnOutcome,
};
pub use use_cases::tool_helpers::args_preview;
