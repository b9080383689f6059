//! File operation tools: read_file, write_file

use super::builtin::{BuiltinTool, Workspace, cancellable};
use async_trait::async_trait;
use conch_domain::{
    ParamType, ParameterSpec, PayloadMetadata, ToolDescriptor, ToolOutcome, ToolPayload,
    ValidatedArguments,
};
use std::io::ErrorKind;
use tokio::fs;
use tokio_util::sync::CancellationToken;

/// Tool name constants
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";

/// Maximum file size to read (10 MB)
const MAX_READ_SIZE: u64 = 10 * 1024 * 1024;

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn read(&self, arguments: &ValidatedArguments) -> ToolOutcome {
        let path_str = match arguments.require_str("path") {
            Ok(p) => p,
            Err(e) => return ToolOutcome::execution_error(e),
        };
        let path = self.workspace.resolve(path_str);

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ToolOutcome::execution_error(format!("File not found: {}", path_str));
            }
            Err(e) => {
                return ToolOutcome::execution_error(format!(
                    "Failed to get file metadata: {}",
                    e
                ));
            }
        };

        if !metadata.is_file() {
            return ToolOutcome::execution_error(format!("'{}' is not a file", path_str));
        }

        if metadata.len() > MAX_READ_SIZE {
            return ToolOutcome::execution_error(format!(
                "File too large ({} bytes). Maximum size is {} bytes",
                metadata.len(),
                MAX_READ_SIZE
            ));
        }

        let content = match fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return ToolOutcome::execution_error(format!("Permission denied: {}", path_str));
            }
            Err(e) => {
                return ToolOutcome::execution_error(format!("Failed to read file: {}", e));
            }
        };

        let offset = arguments.get_u64("offset").unwrap_or(0) as usize;
        let limit = arguments.get_u64("limit").map(|l| l as usize);

        let output = if offset > 0 || limit.is_some() {
            let lines: Vec<&str> = content.lines().collect();
            if offset >= lines.len() {
                String::new()
            } else {
                let end = match limit {
                    Some(l) => offset.saturating_add(l).min(lines.len()),
                    None => lines.len(),
                };
                lines[offset..end].join("\n")
            }
        } else {
            content
        };

        let bytes = output.len();
        ToolOutcome::Success(ToolPayload::text(output).with_metadata(PayloadMetadata {
            bytes: Some(bytes),
            path: Some(path_str.to_string()),
            ..Default::default()
        }))
    }
}

#[async_trait]
impl BuiltinTool for ReadFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builtin(READ_FILE, "Read the contents of a file at the specified path")
            .with_parameter(ParameterSpec::required(
                "path",
                "Path to the file to read",
                ParamType::String,
            ))
            .with_parameter(ParameterSpec::optional(
                "offset",
                "Line number to start reading from (0-indexed)",
                ParamType::Integer,
            ))
            .with_parameter(ParameterSpec::optional(
                "limit",
                "Maximum number of lines to read",
                ParamType::Integer,
            ))
    }

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        cancellable(&cancellation, self.read(&arguments)).await
    }
}

pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn write(&self, arguments: &ValidatedArguments) -> ToolOutcome {
        let path_str = match arguments.require_str("path") {
            Ok(p) => p,
            Err(e) => return ToolOutcome::execution_error(e),
        };
        let content = match arguments.require_str("content") {
            Ok(c) => c,
            Err(e) => return ToolOutcome::execution_error(e),
        };
        let path = self.workspace.resolve(path_str);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = fs::create_dir_all(parent).await
        {
            return ToolOutcome::execution_error(format!(
                "Failed to create parent directories: {}",
                e
            ));
        }

        let bytes = content.len();
        if let Err(e) = fs::write(&path, content).await {
            if e.kind() == ErrorKind::PermissionDenied {
                return ToolOutcome::execution_error(format!("Permission denied: {}", path_str));
            }
            return ToolOutcome::execution_error(format!("Failed to write file: {}", e));
        }

        ToolOutcome::Success(
            ToolPayload::text(format!("Successfully wrote {} bytes to {}", bytes, path_str))
                .with_metadata(PayloadMetadata {
                    bytes: Some(bytes),
                    path: Some(path_str.to_string()),
                    ..Default::default()
                }),
        )
    }
}

#[async_trait]
impl BuiltinTool for WriteFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builtin(
            WRITE_FILE,
            "Write content to a file at the specified path. Creates the file and any missing parent directories, or overwrites an existing file.",
        )
        .with_parameter(ParameterSpec::required(
            "path",
            "Path to the file to write",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::required(
            "content",
            "Content to write to the file",
            ParamType::String,
        ))
        .with_confirmation(true)
    }

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        cancellable(&cancellation, self.write(&arguments)).await
    }
}
