//! User confirmation of tool calls

mod interactive;

pub use interactive::{InteractiveConfirmation, parse_answer};
