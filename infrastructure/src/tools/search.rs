//! Search tools: glob_search, grep_search
//!
//! Both walk the filesystem on the blocking pool and check the call's
//! cancellation token between entries.

use super::builtin::{BuiltinTool, Workspace, cancellable};
use async_trait::async_trait;
use conch_domain::{
    ParamType, ParameterSpec, PayloadMetadata, ToolDescriptor, ToolOutcome, ToolPayload,
    ValidatedArguments,
};
use glob::glob;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Tool name constants
pub const GLOB_SEARCH: &str = "glob_search";
pub const GREP_SEARCH: &str = "grep_search";

/// Maximum number of results to return
const MAX_RESULTS: usize = 1000;

/// Maximum file size for grep (5 MB)
const MAX_GREP_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Run a blocking search, abandoning it when the token fires.
async fn run_blocking<F>(cancellation: &CancellationToken, search: F) -> ToolOutcome
where
    F: FnOnce() -> ToolOutcome + Send + 'static,
{
    let task = tokio::task::spawn_blocking(search);
    cancellable(cancellation, async move {
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::execution_error(format!("Search task failed: {}", e)),
        }
    })
    .await
}

pub struct GlobSearchTool {
    workspace: Workspace,
}

impl GlobSearchTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl BuiltinTool for GlobSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builtin(
            GLOB_SEARCH,
            "Search for files matching a glob pattern (e.g., '**/*.rs', 'src/*.txt')",
        )
        .with_parameter(ParameterSpec::required(
            "pattern",
            "Glob pattern to match files",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::optional(
            "path",
            "Base directory to search from (default: working directory)",
            ParamType::String,
        ))
    }

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        let pattern = match arguments.require_str("pattern") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolOutcome::execution_error(e),
        };
        let base_dir = match arguments.get_str("path") {
            Some(p) => self.workspace.resolve(p),
            None => self.workspace.root().to_path_buf(),
        };
        let token = cancellation.clone();
        run_blocking(&cancellation, move || glob_search(&base_dir, &pattern, &token)).await
    }
}

fn glob_search(base_dir: &Path, pattern: &str, cancellation: &CancellationToken) -> ToolOutcome {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("{}/{}", base_dir.display(), pattern)
    };

    let entries = match glob(&full_pattern) {
        Ok(paths) => paths,
        Err(e) => return ToolOutcome::execution_error(format!("Invalid glob pattern: {}", e)),
    };

    let mut results = Vec::new();
    let mut error_count = 0;
    let mut limited = false;

    for entry in entries {
        if cancellation.is_cancelled() {
            return ToolOutcome::cancelled("cancelled");
        }
        if results.len() >= MAX_RESULTS {
            limited = true;
            break;
        }
        match entry {
            Ok(path) => results.push(display_relative(base_dir, &path)),
            Err(_) => error_count += 1,
        }
    }

    let match_count = results.len();
    let mut output = if results.is_empty() {
        "No files found matching the pattern".to_string()
    } else {
        results.join("\n")
    };
    if limited {
        output.push_str(&format!("\n... (limited to {} results)", MAX_RESULTS));
    }
    if error_count > 0 {
        output.push_str(&format!("\n({} paths could not be accessed)", error_count));
    }

    ToolOutcome::Success(ToolPayload::text(output).with_metadata(PayloadMetadata {
        match_count: Some(match_count),
        truncated: limited,
        ..Default::default()
    }))
}

pub struct GrepSearchTool {
    workspace: Workspace,
}

impl GrepSearchTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl BuiltinTool for GrepSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builtin(
            GREP_SEARCH,
            "Search for a regex pattern within file contents",
        )
        .with_parameter(ParameterSpec::required(
            "pattern",
            "Regex pattern to search for",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::optional(
            "path",
            "File or directory to search in (default: working directory)",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::optional(
            "glob",
            "Glob pattern to filter files (e.g., '**/*.rs')",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::optional(
            "context_lines",
            "Number of context lines before and after each match",
            ParamType::Integer,
        ))
        .with_parameter(ParameterSpec::optional(
            "case_insensitive",
            "Perform case-insensitive search",
            ParamType::Boolean,
        ))
    }

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        let pattern = match arguments.require_str("pattern") {
            Ok(p) => p,
            Err(e) => return ToolOutcome::execution_error(e),
        };
        let regex_pattern = if arguments.get_bool("case_insensitive").unwrap_or(false) {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        let regex = match Regex::new(&regex_pattern) {
            Ok(r) => r,
            Err(e) => {
                return ToolOutcome::execution_error(format!("Invalid regex pattern: {}", e));
            }
        };

        let request = GrepRequest {
            root: match arguments.get_str("path") {
                Some(p) => self.workspace.resolve(p),
                None => self.workspace.root().to_path_buf(),
            },
            file_glob: arguments.get_str("glob").map(str::to_string),
            context_lines: arguments.get_u64("context_lines").unwrap_or(0) as usize,
            regex,
        };
        let token = cancellation.clone();
        run_blocking(&cancellation, move || grep_search(&request, &token)).await
    }
}

struct GrepRequest {
    root: PathBuf,
    file_glob: Option<String>,
    context_lines: usize,
    regex: Regex,
}

fn grep_search(request: &GrepRequest, cancellation: &CancellationToken) -> ToolOutcome {
    if !request.root.exists() {
        return ToolOutcome::execution_error(format!(
            "Path not found: {}",
            request.root.display()
        ));
    }

    let (files, base) = if request.root.is_file() {
        let base = request
            .root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        (vec![request.root.clone()], base)
    } else {
        (
            collect_files(&request.root, request.file_glob.as_deref()),
            request.root.clone(),
        )
    };

    let mut results = Vec::new();
    let mut total_matches = 0;

    'files: for file_path in files {
        if cancellation.is_cancelled() {
            return ToolOutcome::cancelled("cancelled");
        }
        if let Ok(metadata) = fs::metadata(&file_path)
            && metadata.len() > MAX_GREP_FILE_SIZE
        {
            continue;
        }
        // Binary and unreadable files are skipped
        let Ok(content) = fs::read_to_string(&file_path) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();
        let file_display = display_relative(&base, &file_path);

        for (line_num, line) in lines.iter().enumerate() {
            if results.len() >= MAX_RESULTS {
                break 'files;
            }
            if !request.regex.is_match(line) {
                continue;
            }
            total_matches += 1;

            if request.context_lines > 0 {
                let start_line = line_num.saturating_sub(request.context_lines);
                let end_line = (line_num + request.context_lines + 1).min(lines.len());

                let mut context_result = format!("{}:", file_display);
                for (i, ctx_line) in lines[start_line..end_line].iter().enumerate() {
                    let actual_line_num = start_line + i + 1;
                    let marker = if actual_line_num == line_num + 1 { ">" } else { " " };
                    context_result.push_str(&format!("\n{}{}: {}", marker, actual_line_num, ctx_line));
                }
                results.push(context_result);
            } else {
                results.push(format!("{}:{}: {}", file_display, line_num + 1, line));
            }
        }
    }

    let limited = results.len() >= MAX_RESULTS;
    let mut output = if results.is_empty() {
        "No matches found".to_string()
    } else {
        results.join("\n")
    };
    if limited {
        output.push_str(&format!("\n... (limited to {} matches)", MAX_RESULTS));
    }

    ToolOutcome::Success(ToolPayload::text(output).with_metadata(PayloadMetadata {
        match_count: Some(total_matches),
        path: Some(request.root.display().to_string()),
        truncated: limited,
        ..Default::default()
    }))
}

/// Collect files from a directory, optionally filtered by a glob pattern
fn collect_files(dir: &Path, file_pattern: Option<&str>) -> Vec<PathBuf> {
    let pattern = file_pattern.unwrap_or("**/*");
    let full_pattern = format!("{}/{}", dir.display(), pattern);

    let mut files = Vec::new();
    if let Ok(paths) = glob(&full_pattern) {
        for entry in paths.flatten() {
            if files.len() >= MAX_RESULTS * 10 {
                break;
            }
            if entry.is_file() {
                files.push(entry);
            }
        }
    }
    files
}

fn display_relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
