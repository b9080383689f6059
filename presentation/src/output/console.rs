//! Console rendering of a running session

use crate::progress::ModelSpinner;
use colored::Colorize;
use conch_application::{SessionObserver, args_preview};
use conch_domain::{
    BudgetExceeded, CommandResult, ConfigIssue, Severity, ToolCallRequest, ToolCallResult,
    ToolOutcome, first_line,
};

/// Longest error message shown inline for a failed tool call
const MAX_ERROR_DISPLAY: usize = 120;

/// Prints model output, tool activity and command results to stdout.
///
/// With `quiet`, the spinner and per-call lines are suppressed; content,
/// command output and stop reasons are always shown.
pub struct ConsoleObserver {
    spinner: ModelSpinner,
    quiet: bool,
}

impl ConsoleObserver {
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: ModelSpinner::new(!quiet),
            quiet,
        }
    }

    pub fn format_tool_call(request: &ToolCallRequest) -> String {
        let preview = args_preview(request);
        if preview.is_empty() {
            format!("  {} {}", "→".cyan(), request.tool_name.bold())
        } else {
            format!(
                "  {} {} {}",
                "→".cyan(),
                request.tool_name.bold(),
                preview.dimmed()
            )
        }
    }

    pub fn format_tool_result(result: &ToolCallResult) -> String {
        let timing = format!("({}ms)", result.duration_ms).dimmed();
        match &result.outcome {
            ToolOutcome::Success(_) => {
                format!("  {} {} {}", "✓".green(), result.tool_name, timing)
            }
            ToolOutcome::Error { kind, message } => format!(
                "  {} {} {}: {}",
                "✗".red(),
                result.tool_name,
                kind.as_str().red(),
                first_line(message, MAX_ERROR_DISPLAY)
            ),
            ToolOutcome::Cancelled { reason } => format!(
                "  {} {} cancelled: {}",
                "○".yellow(),
                result.tool_name,
                reason
            ),
        }
    }

    pub fn format_issue(issue: &ConfigIssue) -> String {
        match issue.severity {
            Severity::Error => format!("{} {}", "error:".red().bold(), issue.message),
            Severity::Warning => format!("{} {}", "warning:".yellow().bold(), issue.message),
        }
    }

    pub fn format_unknown_command(name: &str, suggestions: &[String]) -> String {
        let mut text = format!("{} /{}", "Unknown command:".red(), name);
        if !suggestions.is_empty() {
            let names: Vec<String> = suggestions.iter().map(|s| format!("/{}", s)).collect();
            text.push_str(&format!("\nDid you mean: {}", names.join(", ")));
        }
        text.push_str(&format!("\n{}", "Type /help for available commands.".dimmed()));
        text
    }

    pub fn print_error(&self, message: &str) {
        self.spinner.stop();
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_model_request(&self, turn: usize) {
        if turn > 1 {
            self.spinner.start(format!("thinking (turn {})", turn));
        } else {
            self.spinner.start("thinking");
        }
    }

    fn on_model_response(&self) {
        self.spinner.stop();
    }

    fn on_content(&self, text: &str) {
        if !text.is_empty() {
            println!("{}\n", text);
        }
    }

    fn on_tool_call(&self, request: &ToolCallRequest) {
        if !self.quiet {
            println!("{}", Self::format_tool_call(request));
        }
    }

    fn on_tool_result(&self, result: &ToolCallResult) {
        if !self.quiet {
            println!("{}", Self::format_tool_result(result));
        }
    }

    fn on_budget_exceeded(&self, exceeded: &BudgetExceeded) {
        self.spinner.stop();
        println!("{} {}", "Stopped:".yellow().bold(), exceeded);
    }

    fn on_cancelled(&self) {
        self.spinner.stop();
        println!("{}", "Cancelled.".yellow());
    }

    fn on_command_result(&self, result: &CommandResult) {
        if let Some(text) = &result.display {
            println!("{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conch_domain::{ConfigIssueCode, ErrorKind};
    use serde_json::json;

    #[test]
    fn test_tool_call_line_shows_preview() {
        let request = ToolCallRequest::new("c1", "read_file", json!({"path": "src/lib.rs"}));
        let line = ConsoleObserver::format_tool_call(&request);
        assert!(line.contains("read_file"));
        assert!(line.contains("src/lib.rs"));
    }

    #[test]
    fn test_failed_result_shows_kind_and_first_line() {
        let request = ToolCallRequest::new("c1", "run_command", json!({}));
        let result = ToolCallResult::new(
            &request,
            ToolOutcome::error(ErrorKind::ExecutionError, "exit 2\nlots of output"),
            15,
        );
        let line = ConsoleObserver::format_tool_result(&result);
        assert!(line.contains("run_command"));
        assert!(line.contains("execution_error"));
        assert!(line.contains("exit 2"));
        assert!(!line.contains("lots of output"));
    }

    #[test]
    fn test_unknown_command_lists_suggestions() {
        let text = ConsoleObserver::format_unknown_command(
            "hlep",
            &["help".to_string(), "history".to_string()],
        );
        assert!(text.contains("/hlep"));
        assert!(text.contains("/help, /history"));
    }

    #[test]
    fn test_issue_formatting() {
        let issue = ConfigIssue::warning(ConfigIssueCode::DuplicateCommand, "dup 'deploy'");
        assert!(ConsoleObserver::format_issue(&issue).contains("dup 'deploy'"));
    }
}
