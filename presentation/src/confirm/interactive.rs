//! Interactive tool-call confirmation.
//!
//! When a call needs approval, the user sees:
//!
//! ```text
//! ── Confirm tool call ──────────────────────────
//!   run_command (built-in)
//!   {"command": "rm -rf build"}
//! Allow? [y]es / [a]lways / [n]o:
//! ```
//!
//! | Answer | Aliases | Decision |
//! |--------|---------|----------|
//! | `y` | `yes` | approve this call |
//! | `a` | `always` | approve this tool for the rest of the session |
//! | `n` | `no`, empty | deny |

use crate::repl::SharedInput;
use async_trait::async_trait;
use colored::Colorize;
use conch_application::{ConfirmationDecision, ConfirmationPort, ConfirmationRequest};
use conch_domain::truncate;
use std::io::{self, Write};

/// Longest argument rendering shown in the prompt
const MAX_ARGS_DISPLAY: usize = 600;

/// Terminal-based [`ConfirmationPort`].
///
/// Prompts are serialized through the session's [`SharedInput`], so
/// concurrent requests from one batch are asked one after another.
pub struct InteractiveConfirmation {
    input: SharedInput,
}

impl InteractiveConfirmation {
    pub fn new(input: SharedInput) -> Self {
        Self { input }
    }

    fn display_prompt(request: &ConfirmationRequest<'_>) {
        println!();
        println!("{}", "── Confirm tool call ──────────────────────────".yellow().bold());
        println!(
            "  {} {}",
            request.descriptor.name.bold(),
            format!("({})", request.descriptor.source).dimmed()
        );
        let arguments = serde_json::to_string_pretty(&request.request.arguments)
            .unwrap_or_else(|_| request.request.arguments.to_string());
        for line in truncate(&arguments, MAX_ARGS_DISPLAY).lines() {
            println!("  {}", line);
        }
    }
}

/// Map one answer line to a decision. Empty input denies.
pub fn parse_answer(line: &str) -> Option<ConfirmationDecision> {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(ConfirmationDecision::Approve),
        "a" | "always" => Some(ConfirmationDecision::ApproveAlways),
        "" | "n" | "no" => Some(ConfirmationDecision::Deny),
        _ => None,
    }
}

#[async_trait]
impl ConfirmationPort for InteractiveConfirmation {
    async fn confirm(&self, request: ConfirmationRequest<'_>) -> ConfirmationDecision {
        let mut input = self.input.lock().await;
        Self::display_prompt(&request);

        loop {
            print!("{} ", "Allow? [y]es / [a]lways / [n]o:".cyan().bold());
            let _ = io::stdout().flush();

            match input.read_line().await {
                Ok(Some(line)) => match parse_answer(&line) {
                    Some(decision) => return decision,
                    None => println!("{}", "Please answer y, a or n.".dimmed()),
                },
                // Closed input can never approve anything
                Ok(None) | Err(_) => return ConfirmationDecision::Deny,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::LineInput;
    use conch_domain::{ToolCallRequest, ToolDescriptor};
    use serde_json::json;

    async fn answer(typed: &'static str) -> ConfirmationDecision {
        let confirmation =
            InteractiveConfirmation::new(LineInput::from_reader(typed.as_bytes()).shared());
        let request = ToolCallRequest::new("c1", "write_file", json!({"path": "a.txt"}));
        let descriptor = ToolDescriptor::builtin("write_file", "Write a file");
        confirmation
            .confirm(ConfirmationRequest {
                request: &request,
                descriptor: &descriptor,
            })
            .await
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(" Y "), Some(ConfirmationDecision::Approve));
        assert_eq!(parse_answer("always"), Some(ConfirmationDecision::ApproveAlways));
        assert_eq!(parse_answer(""), Some(ConfirmationDecision::Deny));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[tokio::test]
    async fn test_reasks_until_answer_is_understood() {
        assert_eq!(answer("maybe\nsure?\na\n").await, ConfirmationDecision::ApproveAlways);
    }

    #[tokio::test]
    async fn test_closed_input_denies() {
        assert_eq!(answer("").await, ConfirmationDecision::Deny);
        assert_eq!(answer("what\n").await, ConfirmationDecision::Deny);
    }
}
