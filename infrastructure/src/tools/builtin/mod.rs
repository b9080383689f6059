//! Built-in tools
//!
//! In-process tools that are always available: file access, shell commands
//! and search, plus `web_fetch` with the `web-tools` feature. Each tool is
//! a [`BuiltinTool`] registered with the [`ToolRegistry`](super::ToolRegistry)
//! at startup.

use async_trait::async_trait;
use conch_domain::{ToolDescriptor, ToolOutcome, ValidatedArguments};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::command::RunCommandTool;
use super::file::{ReadFileTool, WriteFileTool};
use super::search::{GlobSearchTool, GrepSearchTool};

/// An in-process tool.
///
/// Arguments have already been validated against [`descriptor`](Self::descriptor).
/// Implementations must stop promptly once `cancellation` fires and must
/// map every failure to a [`ToolOutcome`].
#[async_trait]
pub trait BuiltinTool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome;
}

/// Directory relative tool paths are resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The process working directory, or `.` if it cannot be determined.
    pub fn current() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Create the default set of built-in tools, in registration order.
pub fn default_tools(workspace: &Workspace) -> Vec<Box<dyn BuiltinTool>> {
    #[allow(unused_mut)]
    let mut tools: Vec<Box<dyn BuiltinTool>> = vec![
        Box::new(ReadFileTool::new(workspace.clone())),
        Box::new(WriteFileTool::new(workspace.clone())),
        Box::new(RunCommandTool::new(workspace.clone())),
        Box::new(GlobSearchTool::new(workspace.clone())),
        Box::new(GrepSearchTool::new(workspace.clone())),
    ];

    #[cfg(feature = "web-tools")]
    tools.push(Box::new(super::web::WebFetchTool::new()));

    tools
}

/// Names of every built-in tool compiled into this build.
pub fn builtin_names() -> Vec<String> {
    default_tools(&Workspace::new("."))
        .iter()
        .map(|tool| tool.descriptor().name)
        .collect()
}

/// Run `work` unless `cancellation` fires first.
pub(crate) async fn cancellable<F>(cancellation: &CancellationToken, work: F) -> ToolOutcome
where
    F: Future<Output = ToolOutcome>,
{
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => ToolOutcome::cancelled("cancelled"),
        outcome = work => outcome,
    }
}

/// Cut `text` to at most `max_bytes` on a char boundary. Returns whether
/// anything was removed.
pub(crate) fn truncate_in_place(text: &mut String, max_bytes: usize) -> bool {
    if text.len() <= max_bytes {
        return false;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_resolves_relative_paths() {
        let ws = Workspace::new("/work");
        assert_eq!(ws.resolve("src/lib.rs"), PathBuf::from("/work/src/lib.rs"));
        assert_eq!(ws.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_default_tools_have_unique_valid_names() {
        let tools = default_tools(&Workspace::new("."));
        let mut names: Vec<String> = tools.iter().map(|t| t.descriptor().name).collect();
        assert!(names.iter().all(|n| ToolDescriptor::is_valid_name(n)));
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_truncate_in_place_respects_char_boundaries() {
        let mut s = "aé".to_string();
        assert!(truncate_in_place(&mut s, 2));
        assert_eq!(s, "a");
        let mut short = "abc".to_string();
        assert!(!truncate_in_place(&mut short, 10));
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome = cancellable(&token, std::future::pending()).await;
        assert!(outcome.is_cancelled());
    }
}
