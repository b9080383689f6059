//! Session configuration from TOML (`[session]` section)

use conch_domain::{ApprovalMode, ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};

/// Raw session configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSessionConfig {
    /// Model requests allowed while answering one prompt
    pub max_turns: usize,
    /// Token ceiling for the whole session
    pub max_session_tokens: Option<u64>,
    /// "ask", "auto-edit" or "yolo"
    pub approval_mode: String,
}

impl Default for FileSessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_session_tokens: None,
            approval_mode: "ask".to_string(),
        }
    }
}

impl FileSessionConfig {
    /// Parse `approval_mode`, falling back to `Ask` with a warning.
    pub fn parse_approval_mode(&self) -> (ApprovalMode, Vec<ConfigIssue>) {
        match self.approval_mode.parse::<ApprovalMode>() {
            Ok(mode) => (mode, vec![]),
            Err(e) => (
                ApprovalMode::Ask,
                vec![ConfigIssue::warning(
                    ConfigIssueCode::UnknownApprovalMode,
                    format!("session.approval_mode: {}, falling back to 'ask'", e),
                )],
            ),
        }
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.parse_approval_mode().1;
        if self.max_turns == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroTurnBudget,
                "session.max_turns must be at least 1",
            ));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approval_mode_aliases() {
        let config = FileSessionConfig {
            approval_mode: "auto_edit".to_string(),
            ..Default::default()
        };
        assert_eq!(config.parse_approval_mode().0, ApprovalMode::AutoEdit);
    }

    #[test]
    fn test_unknown_approval_mode_falls_back_to_ask() {
        let config = FileSessionConfig {
            approval_mode: "sometimes".to_string(),
            ..Default::default()
        };
        let (mode, issues) = config.parse_approval_mode();
        assert_eq!(mode, ApprovalMode::Ask);
        assert_eq!(issues[0].code, ConfigIssueCode::UnknownApprovalMode);
        assert!(!issues[0].is_error());
    }

    #[test]
    fn test_zero_turns_is_an_error() {
        let config = FileSessionConfig {
            max_turns: 0,
            ..Default::default()
        };
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
    }
}
