//! Slash commands owned by the shell itself

mod builtin;

pub use builtin::BuiltinCommands;
