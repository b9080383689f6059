//! Slash command dispatch.
//!
//! Collects descriptors from every [`CommandSource`], merges them through
//! the [`CommandResolver`] and runs the action a line resolves to.

use crate::ports::command_source::CommandSource;
use conch_domain::{
    CommandContext, CommandResolver, CommandResult, ConfigIssue, ToolCatalog, ToolSummary,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Result of feeding one input line to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The line is a prompt for the model
    NotACommand,
    /// Looks like a command but nothing by that name exists
    Unknown {
        name: String,
        suggestions: Vec<String>,
    },
    Executed(CommandResult),
}

pub struct CommandDispatcher {
    resolver: CommandResolver,
}

impl CommandDispatcher {
    pub fn new(resolver: CommandResolver) -> Self {
        Self { resolver }
    }

    /// Load every source and merge the results.
    ///
    /// Issues from loading and from resolution are returned together; none
    /// of them prevents the dispatcher from being built.
    pub fn from_sources<S>(sources: &[S]) -> (Self, Vec<ConfigIssue>)
    where
        S: AsRef<dyn CommandSource>,
    {
        let mut descriptors = Vec::new();
        let mut issues = Vec::new();
        for source in sources {
            let source = source.as_ref();
            let load = source.load();
            debug!(
                source = source.name(),
                commands = load.commands.len(),
                issues = load.issues.len(),
                "Loaded command source"
            );
            descriptors.extend(load.commands);
            issues.extend(load.issues);
        }

        let (resolver, resolve_issues) = CommandResolver::build(descriptors);
        for issue in &resolve_issues {
            warn!(code = ?issue.code, "{}", issue.message);
        }
        issues.extend(resolve_issues);
        info!(commands = resolver.len(), "Command namespace ready");
        (Self::new(resolver), issues)
    }

    pub fn resolver(&self) -> &CommandResolver {
        &self.resolver
    }

    /// Build the read-only context handed to command actions.
    pub fn context(
        &self,
        working_dir: impl Into<PathBuf>,
        session_id: impl Into<String>,
        catalog: &ToolCatalog,
        plugins: Vec<String>,
    ) -> CommandContext {
        CommandContext {
            working_dir: working_dir.into(),
            session_id: session_id.into(),
            tools: catalog
                .iter()
                .map(|d| ToolSummary {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    source: d.source.to_string(),
                })
                .collect(),
            commands: self.resolver.summaries(),
            plugins,
        }
    }

    /// Run the command named by `line`, if it is one.
    pub fn dispatch(&self, line: &str, context: &CommandContext) -> DispatchOutcome {
        let trimmed = line.trim();
        let Some(body) = trimmed.strip_prefix('/') else {
            return DispatchOutcome::NotACommand;
        };
        // "//text" escapes a prompt that starts with a slash
        if body.is_empty() || body.starts_with('/') || body.starts_with(char::is_whitespace) {
            return DispatchOutcome::NotACommand;
        }

        match self.resolver.parse(trimmed) {
            Some(parsed) => {
                debug!(
                    command = %parsed.invocation.path.join(" "),
                    args = %parsed.invocation.args,
                    "Dispatching command"
                );
                DispatchOutcome::Executed(parsed.command.invoke(&parsed.invocation, context))
            }
            None => {
                let name = body.split_whitespace().next().unwrap_or_default().to_string();
                let suggestions = self.suggestions(&name);
                DispatchOutcome::Unknown { name, suggestions }
            }
        }
    }

    fn suggestions(&self, name: &str) -> Vec<String> {
        let by_prefix: Vec<String> = self
            .resolver
            .completions(name)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !by_prefix.is_empty() {
            return by_prefix;
        }
        // `deploy` should point at `acme.deploy`
        self.resolver
            .commands()
            .iter()
            .map(|c| c.name())
            .filter(|n| n.contains(name) || n.rsplit('.').next() == Some(name))
            .map(str::to_string)
            .collect()
    }
}
