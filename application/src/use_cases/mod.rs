//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod dispatch_command;
pub mod execute_batch;
pub mod run_conversation;
pub(crate) mod shared;
pub mod tool_helpers;

#[cfg(test)]
pub(crate) mod testing;
