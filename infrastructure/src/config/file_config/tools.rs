//! Tool configuration from TOML (`[tools]` section)

use conch_domain::{ConfigIssue, ConfigIssueCode, DEFAULT_CONFIRM_COMMANDS, ShellCommandPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw tool configuration from TOML
///
/// # Example
///
/// ```toml
/// [tools]
/// timeout_secs = 60
/// confirm_commands = ["rm", "git push", "kubectl delete"]
/// disabled = ["web_fetch"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileToolsConfig {
    /// Deadline for one tool call, in seconds
    pub timeout_secs: u64,
    /// Grace period for cancelled calls, in milliseconds
    pub cancel_grace_ms: u64,
    /// `run_command` programs that always need confirmation
    pub confirm_commands: Vec<String>,
    /// Built-in tools that are not registered
    pub disabled: Vec<String>,
}

impl Default for FileToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            cancel_grace_ms: 2000,
            confirm_commands: DEFAULT_CONFIRM_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            disabled: Vec::new(),
        }
    }
}

impl FileToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }

    /// Deny-list policy for `run_command`
    pub fn shell_policy(&self) -> ShellCommandPolicy {
        ShellCommandPolicy::new("run_command", "command", &self.confirm_commands)
    }

    /// Check `disabled` against the names in `known`.
    pub fn validate(&self, known: &[String]) -> Vec<ConfigIssue> {
        let mut issues: Vec<ConfigIssue> = self
            .disabled
            .iter()
            .filter(|name| !known.contains(name))
            .map(|name| {
                ConfigIssue::warning(
                    ConfigIssueCode::UnknownDisabledTool,
                    format!("tools.disabled: no built-in tool named '{}'", name),
                )
            })
            .collect();
        if self.timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroPluginTimeout,
                "tools.timeout_secs cannot be 0",
            ));
        }
        issues
    }
}
