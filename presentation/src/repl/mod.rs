//! Interactive shell

mod input;
mod shell;

pub use input::{LineInput, SharedInput};
pub use shell::{LineOutcome, ShellRepl, StatusProvider};
