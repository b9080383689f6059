//! Presentation layer for conch
//!
//! This crate contains the CLI definition, the interactive shell, console
//! output, tool-call confirmation and the built-in slash commands.

pub mod cli;
pub mod commands;
pub mod confirm;
pub mod output;
pub mod progress;
pub mod repl;

// Re-export commonly used types
pub use cli::commands::{ApprovalArg, Cli};
pub use commands::BuiltinCommands;
pub use confirm::InteractiveConfirmation;
pub use output::ConsoleObserver;
pub use progress::ModelSpinner;
pub use repl::{LineInput, LineOutcome, SharedInput, ShellRepl, StatusProvider};
