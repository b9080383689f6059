//! Model gateway adapters
//!
//! [`ProcessModelGateway`] talks to a model-bridge process over the same
//! framed JSON-RPC used for plugins. [`EchoModelGateway`] stands in when no
//! bridge is configured.

mod echo;
mod process;

pub use echo::EchoModelGateway;
pub use process::{MODEL_TURN, ProcessModelGateway};
