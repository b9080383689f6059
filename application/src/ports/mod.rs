//! Port definitions (interfaces for external dependencies)
//!
//! Ports define the interfaces that the application layer uses to interact
//! with external systems. Adapters in the infrastructure and presentation
//! layers implement them.

pub mod command_source;
pub mod confirmation;
pub mod conversation_recorder;
pub mod model_gateway;
pub mod session_observer;
pub mod tool_executor;
