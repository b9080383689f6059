//! Prompt commands stored as TOML files.
//!
//! ```text
//! commands/
//!   review.toml          -> /review
//!   git/
//!     summary.toml       -> /git summary
//! ```
//!
//! Each file holds an optional `description` and a `prompt`. Directories
//! become namespace commands without an action of their own.

use super::prompt_command;
use crate::config::ConfigLoader;
use conch_application::{CommandLoad, CommandSource};
use conch_domain::{CommandDescriptor, CommandOrigin, ConfigIssue, ConfigIssueCode};
use glob::glob;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CommandFile {
    #[serde(default)]
    description: String,
    prompt: String,
}

#[derive(Default)]
struct Node {
    file: Option<CommandFile>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn insert(&mut self, path: &[String], file: CommandFile) {
        match path {
            [] => self.file = Some(file),
            [first, rest @ ..] => self
                .children
                .entry(first.clone())
                .or_default()
                .insert(rest, file),
        }
    }

    fn into_descriptor(self, name: String, origin: &CommandOrigin) -> CommandDescriptor {
        let mut descriptor = match self.file {
            Some(file) => prompt_command(name, file.description, origin.clone(), file.prompt),
            None => {
                let description = format!("{} commands", name);
                CommandDescriptor::new(name, description, origin.clone())
            }
        };
        for (child_name, child) in self.children {
            descriptor = descriptor.with_subcommand(child.into_descriptor(child_name, origin));
        }
        descriptor
    }
}

/// Loads `<root>/**/*.toml` as commands of one origin tier
pub struct FileCommandSource {
    label: String,
    origin: CommandOrigin,
    root: PathBuf,
}

impl FileCommandSource {
    pub fn new(label: impl Into<String>, origin: CommandOrigin, root: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            origin,
            root: root.into(),
        }
    }

    /// `$XDG_CONFIG_HOME/conch/commands`
    pub fn user() -> Option<Self> {
        ConfigLoader::config_home()
            .map(|home| Self::new("user commands", CommandOrigin::User, home.join("commands")))
    }

    /// `<working_dir>/.conch/commands`
    pub fn project(working_dir: &Path) -> Self {
        Self::new(
            "project commands",
            CommandOrigin::Project,
            working_dir.join(".conch").join("commands"),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn command_path(&self, file: &Path) -> Option<Vec<String>> {
        let relative = file.strip_prefix(&self.root).ok()?.with_extension("");
        relative
            .components()
            .map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect()
    }

    fn invalid(&self, path: &Path, reason: impl std::fmt::Display) -> ConfigIssue {
        ConfigIssue::warning(
            ConfigIssueCode::InvalidCommandFile,
            format!("{}: skipping {}: {}", self.label, path.display(), reason),
        )
    }
}

impl CommandSource for FileCommandSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn load(&self) -> CommandLoad {
        let mut load = CommandLoad::default();
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "No command directory");
            return load;
        }

        let pattern = format!(
            "{}/**/*.toml",
            glob::Pattern::escape(&self.root.to_string_lossy())
        );
        let entries = match glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                load.issues.push(self.invalid(&self.root, e));
                return load;
            }
        };

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => load.issues.push(self.invalid(e.path(), e.error())),
            }
        }
        files.sort();

        let mut tree = Node::default();
        for path in files {
            let Some(command_path) = self.command_path(&path) else {
                load.issues.push(self.invalid(&path, "file name is not valid UTF-8"));
                continue;
            };
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| toml::from_str::<CommandFile>(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(file) => tree.insert(&command_path, file),
                Err(e) => {
                    warn!(file = %path.display(), "Invalid command file: {}", e);
                    load.issues.push(self.invalid(&path, e));
                }
            }
        }

        load.commands = tree
            .children
            .into_iter()
            .map(|(name, node)| node.into_descriptor(name, &self.origin))
            .collect();
        debug!(source = %self.label, commands = load.commands.len(), "Loaded commands");
        load
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conch_domain::{CommandContext, CommandInvocation, FollowUp};

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn submitted(descriptor: &CommandDescriptor, args: &str) -> Option<FollowUp> {
        let action = descriptor.action.as_ref().unwrap();
        let inv = CommandInvocation::new(vec![descriptor.name.clone()], args);
        action(&inv, &CommandContext::default()).follow_up
    }

    #[test]
    fn test_missing_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source =
            FileCommandSource::new("project commands", CommandOrigin::Project, dir.path().join("x"));

        let load = source.load();
        assert!(load.commands.is_empty());
        assert!(load.issues.is_empty());
    }

    #[test]
    fn test_files_become_prompt_commands() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "review.toml",
            "description = \"Review a file\"\nprompt = \"Review {{args}} carefully.\"\n",
        );
        let source = FileCommandSource::new("user commands", CommandOrigin::User, dir.path());

        let load = source.load();

        assert_eq!(load.commands.len(), 1);
        let review = &load.commands[0];
        assert_eq!(review.name, "review");
        assert_eq!(review.description, "Review a file");
        assert_eq!(review.origin, CommandOrigin::User);
        assert_eq!(
            submitted(review, "src/main.rs"),
            Some(FollowUp::SubmitPrompt("Review src/main.rs carefully.".to_string()))
        );
    }

    #[test]
    fn test_directories_become_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "git/summary.toml", "prompt = \"Summarise the log.\"\n");
        write(dir.path(), "git/blame.toml", "prompt = \"Explain the blame.\"\n");

        let source = FileCommandSource::new("project commands", CommandOrigin::Project, dir.path());
        let load = source.load();

        assert_eq!(load.commands.len(), 1);
        let git = &load.commands[0];
        assert_eq!(git.name, "git");
        assert!(git.action.is_none());
        let names: Vec<_> = git.subcommands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["blame", "summary"]);
        assert_eq!(
            submitted(&git.subcommands[1], ""),
            Some(FollowUp::SubmitPrompt("Summarise the log.".to_string()))
        );
    }

    #[test]
    fn test_project_root_is_dot_conch_commands() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".conch/commands/fix.toml", "prompt = \"Fix it.\"\n");

        let load = FileCommandSource::project(dir.path()).load();

        assert_eq!(load.commands.len(), 1);
        assert_eq!(load.commands[0].origin, CommandOrigin::Project);
    }

    #[test]
    fn test_broken_files_are_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.toml", "prompt = \"ok\"\n");
        write(dir.path(), "bad.toml", "description = \"no prompt\"\n");
        write(dir.path(), "worse.toml", "prompt = [unclosed\n");
        write(dir.path(), "notes.md", "ignored");

        let source = FileCommandSource::new("user commands", CommandOrigin::User, dir.path());
        let load = source.load();

        assert_eq!(load.commands.len(), 1);
        assert_eq!(load.commands[0].name, "good");
        assert_eq!(load.issues.len(), 2);
        assert!(load
            .issues
            .iter()
            .all(|i| i.code == ConfigIssueCode::InvalidCommandFile && !i.is_error()));
    }
}
