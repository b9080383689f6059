//! Confirmation policy for tool calls.
//!
//! A descriptor's `requires_confirmation` flag is the baseline. Policies can
//! additionally flag individual calls based on their argument values, e.g. a
//! `run_command` whose command line starts with `rm`. Policies only ever add
//! confirmation; [`ApprovalMode::Yolo`] is the single switch that removes it.

use super::entities::ToolDescriptor;
use super::schema::ValidatedArguments;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Session-wide approval behaviour, chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// Ask whenever the descriptor or a policy says so
    #[default]
    Ask,
    /// Like `Ask`, but built-in file edits are approved automatically
    AutoEdit,
    /// Never ask
    Yolo,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Ask => "ask",
            ApprovalMode::AutoEdit => "auto-edit",
            ApprovalMode::Yolo => "yolo",
        }
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" | "default" => Ok(ApprovalMode::Ask),
            "auto-edit" | "auto_edit" | "autoedit" => Ok(ApprovalMode::AutoEdit),
            "yolo" => Ok(ApprovalMode::Yolo),
            other => Err(format!(
                "unknown approval mode '{}' (expected ask, auto-edit or yolo)",
                other
            )),
        }
    }
}

/// Argument-sensitive confirmation rule.
pub trait ConfirmationPolicy: Send + Sync {
    /// Return true to require confirmation for this specific call.
    fn flags(&self, descriptor: &ToolDescriptor, arguments: &ValidatedArguments) -> bool;
}

/// Policy that never flags anything.
pub struct NoPolicy;

impl ConfirmationPolicy for NoPolicy {
    fn flags(&self, _descriptor: &ToolDescriptor, _arguments: &ValidatedArguments) -> bool {
        false
    }
}

/// Deny-list over the programs of a shell command line.
///
/// The command string is split on `&&`, `||`, `;` and `|`; each segment's
/// leading words (after `VAR=value` assignments) are matched against the
/// list. Entries may be multi-word prefixes such as `git push`.
pub struct ShellCommandPolicy {
    tool_name: String,
    argument: String,
    deny: Vec<Vec<String>>,
}

/// Default deny-list for `run_command`.
pub const DEFAULT_CONFIRM_COMMANDS: &[&str] = &[
    "rm", "sudo", "mv", "dd", "chmod", "chown", "mkfs", "git push", "git reset",
];

impl ShellCommandPolicy {
    pub fn new<I, S>(tool_name: impl Into<String>, argument: impl Into<String>, deny: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tool_name: tool_name.into(),
            argument: argument.into(),
            deny: deny
                .into_iter()
                .map(|d| d.as_ref().split_whitespace().map(str::to_string).collect())
                .filter(|words: &Vec<String>| !words.is_empty())
                .collect(),
        }
    }

    /// Policy for the built-in `run_command` tool with the default deny-list.
    pub fn for_run_command() -> Self {
        Self::new("run_command", "command", DEFAULT_CONFIRM_COMMANDS.iter().copied())
    }

    /// Split a command line into the segments that each start a program.
    ///
    /// Sequences, pipes, background jobs, subshells and command
    /// substitutions (`$(..)` and backticks) all start new segments.
    pub fn segments(command: &str) -> Vec<&str> {
        let mut segments = Vec::new();
        let bytes = command.as_bytes();
        let mut start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let sep_len = match bytes[i] {
                b'&' if bytes.get(i + 1) == Some(&b'&') => 2,
                b'|' if bytes.get(i + 1) == Some(&b'|') => 2,
                b'$' if bytes.get(i + 1) == Some(&b'(') => 2,
                b'|' | b'&' | b';' | b'\n' | b'(' | b')' | b'`' => 1,
                _ => 0,
            };
            if sep_len > 0 {
                segments.push(command[start..i].trim());
                i += sep_len;
                start = i;
            } else {
                i += 1;
            }
        }
        segments.push(command[start..].trim());
        segments.retain(|s| !s.is_empty());
        segments
    }

    fn segment_matches(&self, segment: &str) -> bool {
        let words: Vec<&str> = segment
            .split_whitespace()
            .skip_while(|w| w.contains('=') && !w.starts_with('='))
            .collect();
        let Some(&first) = words.first() else {
            return false;
        };
        // `/bin/rm` is still `rm`
        let program = first.rsplit('/').next().unwrap_or(first);

        self.deny.iter().any(|entry| {
            entry.len() <= words.len()
                && entry[0] == program
                && entry[1..].iter().zip(&words[1..]).all(|(a, b)| a.as_str() == *b)
        })
    }
}

impl ConfirmationPolicy for ShellCommandPolicy {
    fn flags(&self, descriptor: &ToolDescriptor, arguments: &ValidatedArguments) -> bool {
        if descriptor.name != self.tool_name || !descriptor.source.is_builtin() {
            return false;
        }
        let Some(command) = arguments.get_str(&self.argument) else {
            return false;
        };
        Self::segments(command)
            .into_iter()
            .any(|segment| self.segment_matches(segment))
    }
}

/// Name of the built-in tool that `AutoEdit` approves automatically.
pub const FILE_EDIT_TOOL: &str = "write_file";

/// Decide whether a validated call must be confirmed by the user.
pub fn requires_confirmation(
    descriptor: &ToolDescriptor,
    arguments: &ValidatedArguments,
    policy: &dyn ConfirmationPolicy,
    mode: ApprovalMode,
) -> bool {
    match mode {
        ApprovalMode::Yolo => false,
        ApprovalMode::AutoEdit
            if descriptor.source.is_builtin() && descriptor.name == FILE_EDIT_TOOL =>
        {
            false
        }
        _ => descriptor.requires_confirmation || policy.flags(descriptor, arguments),
    }
}
