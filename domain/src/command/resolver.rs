//! Merging ranked command sources into a single namespace.
//!
//! Rules, applied per level of the command tree:
//!
//! - Sources are processed in rank order (built-in, user, project,
//!   extension); extensions keep their load order.
//! - A duplicate name within one origin is a configuration issue; the first
//!   definition wins.
//! - A name already taken by an earlier (higher-priority) command is
//!   prefixed with the origin's identifier: an extension `acme` defining
//!   `deploy` next to a user `deploy` is reachable as `acme.deploy`.
//! - If the prefixed name is also taken, the command is dropped and
//!   reported.
//!
//! Subcommands are resolved recursively with the same rules, scoped to their
//! parent.

use super::entities::{
    CommandContext, CommandDescriptor, CommandInvocation, CommandOrigin, CommandResult,
    CommandSummary,
};
use crate::core::validation::{ConfigIssue, ConfigIssueCode};
use std::collections::{HashMap, HashSet};

/// A command after conflict resolution
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    name: String,
    declared_name: String,
    descriptor: CommandDescriptor,
    subcommands: Vec<ResolvedCommand>,
    index: HashMap<String, usize>,
}

impl ResolvedCommand {
    /// Effective (possibly prefixed) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as written in the source definition
    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    pub fn was_renamed(&self) -> bool {
        self.name != self.declared_name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn origin(&self) -> &CommandOrigin {
        &self.descriptor.origin
    }

    pub fn subcommands(&self) -> &[ResolvedCommand] {
        &self.subcommands
    }

    pub fn subcommand(&self, name: &str) -> Option<&ResolvedCommand> {
        self.index.get(name).map(|&i| &self.subcommands[i])
    }

    /// Run the command's action. Namespaces without an action list their
    /// subcommands instead.
    pub fn invoke(&self, invocation: &CommandInvocation, context: &CommandContext) -> CommandResult {
        match &self.descriptor.action {
            Some(action) => action(invocation, context),
            None => {
                let mut text = format!("/{} subcommands:", invocation.path.join(" "));
                for sub in &self.subcommands {
                    text.push_str(&format!("\n  {:<16} {}", sub.name, sub.description()));
                }
                CommandResult::display(text)
            }
        }
    }
}

/// A parsed command line: the deepest matching command plus its arguments
#[derive(Debug, Clone)]
pub struct ParsedCommand<'a> {
    pub command: &'a ResolvedCommand,
    pub invocation: CommandInvocation,
}

/// The merged, immutable command namespace of a session
#[derive(Debug, Clone, Default)]
pub struct CommandResolver {
    commands: Vec<ResolvedCommand>,
    index: HashMap<String, usize>,
}

impl CommandResolver {
    /// Merge descriptors from every tier.
    ///
    /// Never fails: problems are returned as issues next to the resolver so
    /// the caller can report them and carry on.
    pub fn build<I>(descriptors: I) -> (Self, Vec<ConfigIssue>)
    where
        I: IntoIterator<Item = CommandDescriptor>,
    {
        let mut ordered: Vec<CommandDescriptor> = descriptors.into_iter().collect();
        // stable: extensions keep their load order
        ordered.sort_by_key(|d| d.origin.rank());

        let mut issues = Vec::new();
        let commands = resolve_level(ordered, "", &mut issues);
        let index = build_index(&commands);
        (Self { commands, index }, issues)
    }

    /// Resolve a command path such as `["acme.deploy", "prod"]`.
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Option<&ResolvedCommand> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first.as_ref())?;
        for segment in rest {
            current = current.subcommand(segment.as_ref())?;
        }
        Some(current)
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedCommand> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    /// Parse a line like `/deploy prod --force`.
    ///
    /// Descends into subcommands while the next word names one; everything
    /// after the deepest match becomes the argument string.
    pub fn parse<'a>(&'a self, line: &str) -> Option<ParsedCommand<'a>> {
        let line = line.trim_start().strip_prefix('/')?;
        let (head, mut rest) = split_word(line);
        let mut command = self.get(head)?;
        let mut path = vec![command.name.clone()];

        loop {
            let (word, after) = split_word(rest);
            match command.subcommand(word) {
                Some(sub) if !word.is_empty() => {
                    command = sub;
                    path.push(sub.name.clone());
                    rest = after;
                }
                _ => break,
            }
        }

        Some(ParsedCommand {
            command,
            invocation: CommandInvocation::new(path, rest.trim()),
        })
    }

    /// Top-level names starting with `prefix`, in namespace order.
    pub fn completions(&self, prefix: &str) -> Vec<&str> {
        let prefix = prefix.strip_prefix('/').unwrap_or(prefix);
        self.commands
            .iter()
            .map(|c| c.name.as_str())
            .filter(|n| n.starts_with(prefix))
            .collect()
    }

    pub fn commands(&self) -> &[ResolvedCommand] {
        &self.commands
    }

    pub fn summaries(&self) -> Vec<CommandSummary> {
        self.commands
            .iter()
            .map(|c| CommandSummary {
                name: c.name.clone(),
                description: c.description().to_string(),
                origin: c.origin().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn build_index(commands: &[ResolvedCommand]) -> HashMap<String, usize> {
    commands
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.clone(), i))
        .collect()
}

fn resolve_level(
    descriptors: Vec<CommandDescriptor>,
    scope: &str,
    issues: &mut Vec<ConfigIssue>,
) -> Vec<ResolvedCommand> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut declared: HashSet<(CommandOrigin, String)> = HashSet::new();
    let mut resolved = Vec::new();

    for mut descriptor in descriptors {
        let declared_name = descriptor.name.clone();
        let qualified = qualify(scope, &declared_name);

        if !CommandDescriptor::is_valid_name(&declared_name) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidCommandName,
                format!(
                    "{} command '{}' has an invalid name and was skipped",
                    descriptor.origin, qualified
                ),
            ));
            continue;
        }

        if !declared.insert((descriptor.origin.clone(), declared_name.clone())) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::DuplicateCommand,
                format!(
                    "{} command '{}' is defined more than once; keeping the first definition",
                    descriptor.origin, qualified
                ),
            ));
            continue;
        }

        let name = if !taken.contains(&declared_name) {
            declared_name.clone()
        } else {
            let prefixed = format!("{}.{}", descriptor.origin.prefix(), declared_name);
            if taken.contains(&prefixed) {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnresolvableCommandCollision,
                    format!(
                        "{} command '{}' collides with an existing command even as '{}'; skipped",
                        descriptor.origin,
                        qualified,
                        qualify(scope, &prefixed)
                    ),
                ));
                continue;
            }
            prefixed
        };
        taken.insert(name.clone());

        let children = std::mem::take(&mut descriptor.subcommands);
        let subcommands = resolve_level(children, &qualify(scope, &name), issues);
        let index = build_index(&subcommands);

        resolved.push(ResolvedCommand {
            name,
            declared_name,
            descriptor,
            subcommands,
            index,
        });
    }

    resolved
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", scope, name)
    }
}
