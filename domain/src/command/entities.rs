//! Command entities

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a command definition came from, in descending priority
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOrigin {
    BuiltIn,
    /// Home-level definitions
    User,
    /// Repository-level definitions
    Project,
    /// Definitions shipped by an installed extension
    Extension(String),
}

impl CommandOrigin {
    /// Lower ranks win name collisions.
    pub fn rank(&self) -> u8 {
        match self {
            CommandOrigin::BuiltIn => 0,
            CommandOrigin::User => 1,
            CommandOrigin::Project => 2,
            CommandOrigin::Extension(_) => 3,
        }
    }

    /// Prefix used when this origin's command has to be renamed.
    pub fn prefix(&self) -> &str {
        match self {
            CommandOrigin::BuiltIn => "builtin",
            CommandOrigin::User => "user",
            CommandOrigin::Project => "project",
            CommandOrigin::Extension(id) => id,
        }
    }
}

impl fmt::Display for CommandOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOrigin::BuiltIn => f.write_str("built-in"),
            CommandOrigin::User => f.write_str("user"),
            CommandOrigin::Project => f.write_str("project"),
            CommandOrigin::Extension(id) => write!(f, "extension:{}", id),
        }
    }
}

/// Parsed arguments of one command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Resolved (effective) names from the top-level command down
    pub path: Vec<String>,
    /// Everything after the command path, trimmed
    pub args: String,
}

impl CommandInvocation {
    pub fn new(path: Vec<String>, args: impl Into<String>) -> Self {
        Self {
            path,
            args: args.into(),
        }
    }
}

/// A tool as listed to commands such as `/tools`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub source: String,
}

/// A command as listed to commands such as `/help`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    pub name: String,
    pub description: String,
    pub origin: String,
}

/// Read-only view of the session handed to command actions
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub working_dir: PathBuf,
    pub session_id: String,
    pub tools: Vec<ToolSummary>,
    pub commands: Vec<CommandSummary>,
    /// One line per plugin (`id status tools`), for `/plugins`
    pub plugins: Vec<String>,
}

/// What the shell should do after displaying a command's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Send this text to the model as if the user typed it
    SubmitPrompt(String),
    ClearHistory,
    Quit,
}

/// Output of a command action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub display: Option<String>,
    pub follow_up: Option<FollowUp>,
}

impl CommandResult {
    pub fn display(text: impl Into<String>) -> Self {
        Self {
            display: Some(text.into()),
            follow_up: None,
        }
    }

    pub fn submit(prompt: impl Into<String>) -> Self {
        Self {
            display: None,
            follow_up: Some(FollowUp::SubmitPrompt(prompt.into())),
        }
    }

    pub fn follow_up(action: FollowUp) -> Self {
        Self {
            display: None,
            follow_up: Some(action),
        }
    }

    pub fn with_follow_up(mut self, action: FollowUp) -> Self {
        self.follow_up = Some(action);
        self
    }
}

/// Pure dispatch function behind a command
pub type CommandAction =
    Arc<dyn Fn(&CommandInvocation, &CommandContext) -> CommandResult + Send + Sync>;

/// A slash command definition as produced by a loader
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub origin: CommandOrigin,
    /// `None` for pure namespaces that only group subcommands
    pub action: Option<CommandAction>,
    pub subcommands: Vec<CommandDescriptor>,
}

impl CommandDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        origin: CommandOrigin,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            origin,
            action: None,
            subcommands: Vec::new(),
        }
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&CommandInvocation, &CommandContext) -> CommandResult + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn with_subcommand(mut self, sub: CommandDescriptor) -> Self {
        self.subcommands.push(sub);
        self
    }

    /// Command names may not be empty, contain whitespace, or start with `/`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && !name.starts_with('/') && !name.chars().any(char::is_whitespace)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("has_action", &self.action.is_some())
            .field("subcommands", &self.subcommands)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_rank_order() {
        assert!(CommandOrigin::BuiltIn.rank() < CommandOrigin::User.rank());
        assert!(CommandOrigin::User.rank() < CommandOrigin::Project.rank());
        assert!(CommandOrigin::Project.rank() < CommandOrigin::Extension("x".into()).rank());
    }

    #[test]
    fn test_origin_prefix() {
        assert_eq!(CommandOrigin::Extension("acme".into()).prefix(), "acme");
        assert_eq!(CommandOrigin::Project.prefix(), "project");
    }

    #[test]
    fn test_valid_names() {
        assert!(CommandDescriptor::is_valid_name("deploy"));
        assert!(CommandDescriptor::is_valid_name("acme.deploy"));
        assert!(!CommandDescriptor::is_valid_name(""));
        assert!(!CommandDescriptor::is_valid_name("/deploy"));
        assert!(!CommandDescriptor::is_valid_name("two words"));
    }
}
