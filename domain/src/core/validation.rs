//! Structured configuration findings.
//!
//! Produced by the command resolver (duplicate names within a tier,
//! unresolvable collisions) and by configuration validation. Errors abort
//! startup at the caller's discretion; warnings are only reported.

use std::fmt;

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// Two commands with the same name in one origin tier.
    DuplicateCommand,
    /// A prefixed command name still collides with an existing command.
    UnresolvableCommandCollision,
    /// A command name that cannot be invoked (empty, whitespace, leading `/`).
    InvalidCommandName,
    /// A per-prompt turn ceiling of zero.
    ZeroTurnBudget,
    /// A plugin entry without a command to spawn.
    EmptyPluginCommand,
    /// A plugin whose tool calls would never be allowed to finish.
    ZeroPluginTimeout,
    /// An approval mode string that is not recognised.
    UnknownApprovalMode,
    /// A command definition file that could not be read or parsed.
    InvalidCommandFile,
    /// An extension manifest that could not be read or parsed.
    InvalidExtension,
    /// A tool listed under `disabled` that no built-in provides.
    UnknownDisabledTool,
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", label, self.message)
    }
}
