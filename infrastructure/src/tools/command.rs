//! Command execution tool: run_command

use super::builtin::{BuiltinTool, Workspace, truncate_in_place};
use async_trait::async_trait;
use conch_domain::{
    ErrorKind, ParamType, ParameterSpec, PayloadMetadata, ToolDescriptor, ToolOutcome,
    ToolPayload, ValidatedArguments,
};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tool name constant
pub const RUN_COMMAND: &str = "run_command";

/// Default timeout for command execution (60 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum output size (1 MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
    status: ExitStatus,
}

/// Read until EOF or until `limit` bytes are buffered.
///
/// Returns the bytes and whether more were available.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let Some(mut reader) = reader else {
        return Ok((buf, false));
    };
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok((buf, false));
        }
        let room = limit.saturating_sub(buf.len());
        if n > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Drain both pipes with a cap on each, then reap the child.
///
/// Once a pipe hits the cap its reader is dropped and the child is killed.
async fn capture(child: &mut Child) -> io::Result<Captured> {
    let (stdout, stderr) = tokio::join!(
        read_capped(child.stdout.take(), MAX_OUTPUT_SIZE),
        read_capped(child.stderr.take(), MAX_OUTPUT_SIZE),
    );
    let (stdout, stdout_cut) = stdout?;
    let (stderr, stderr_cut) = stderr?;
    let truncated = stdout_cut || stderr_cut;
    if truncated && let Err(e) = child.start_kill() {
        debug!(error = %e, "Child already gone after output cap");
    }
    let status = child.wait().await?;
    Ok(Captured {
        stdout,
        stderr,
        truncated,
        status,
    })
}

/// Runs a command line through `sh -c`.
///
/// The child is spawned with `kill_on_drop`, so dropping the wait on
/// cancellation or timeout kills it. Each output stream is read
/// incrementally and capped at 1 MB.
pub struct RunCommandTool {
    workspace: Workspace,
}

impl RunCommandTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl BuiltinTool for RunCommandTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builtin(
            RUN_COMMAND,
            "Execute a shell command and return its combined stdout and stderr.",
        )
        .with_parameter(ParameterSpec::required(
            "command",
            "The command to execute",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::optional(
            "working_dir",
            "Working directory for the command",
            ParamType::String,
        ))
        .with_parameter(ParameterSpec::optional(
            "timeout_secs",
            "Timeout in seconds (default: 60)",
            ParamType::Integer,
        ))
    }

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        let command_str = match arguments.require_str("command") {
            Ok(c) => c,
            Err(e) => return ToolOutcome::execution_error(e),
        };
        let timeout_secs = arguments
            .get_u64("timeout_secs")
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let dir = match arguments.get_str("working_dir") {
            Some(dir) => self.workspace.resolve(dir),
            None => self.workspace.root().to_path_buf(),
        };
        if !dir.is_dir() {
            return ToolOutcome::execution_error(format!(
                "Working directory does not exist: {}",
                dir.display()
            ));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command_str)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ToolOutcome::execution_error(format!("Failed to spawn command: {}", e));
            }
        };
        debug!(command = %command_str, pid = ?child.id(), "Spawned command");

        let output = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                debug!(command = %command_str, "Command cancelled, killing child");
                return ToolOutcome::cancelled("command killed on cancellation");
            }
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                return ToolOutcome::error(
                    ErrorKind::Timeout,
                    format!("Command timed out after {} seconds", timeout_secs),
                );
            }
            output = capture(&mut child) => match output {
                Ok(o) => o,
                Err(e) => {
                    return ToolOutcome::execution_error(format!("Failed to wait for process: {}", e));
                }
            },
        };

        let exit_code = output.status.code().unwrap_or(-1);

        // Combine stdout and stderr
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut combined_output = String::new();
        if !stdout.is_empty() {
            combined_output.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !combined_output.is_empty() {
                combined_output.push_str("\n--- stderr ---\n");
            }
            combined_output.push_str(&stderr);
        }

        let truncated =
            truncate_in_place(&mut combined_output, MAX_OUTPUT_SIZE) || output.truncated;
        if truncated {
            combined_output.push_str("\n... (output truncated)");
        }

        let metadata = PayloadMetadata {
            bytes: Some(combined_output.len()),
            exit_code: Some(exit_code),
            truncated,
            ..Default::default()
        };

        // A failing command is still a successful tool call; the model decides what to do
        let text = if output.status.success() {
            combined_output
        } else {
            format!("Command exited with code {}\n{}", exit_code, combined_output)
        };
        ToolOutcome::Success(ToolPayload::text(text).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conch_domain::validate;
    use serde_json::json;
    use std::time::Instant;

    fn tool(dir: &std::path::Path) -> RunCommandTool {
        RunCommandTool::new(Workspace::new(dir))
    }

    async fn run(tool: &RunCommandTool, args: serde_json::Value) -> ToolOutcome {
        let arguments = validate(&tool.descriptor(), &args).unwrap();
        tool.execute(arguments, CancellationToken::new()).await
    }

    fn payload(outcome: ToolOutcome) -> ToolPayload {
        match outcome {
            ToolOutcome::Success(p) => p,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_command_echo() {
        let dir = tempfile::tempdir().unwrap();
        let p = payload(run(&tool(dir.path()), json!({"command": "echo hello"})).await);
        assert!(p.text.contains("hello"));
        assert_eq!(p.metadata.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_run_command_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let p = payload(run(&tool(dir.path()), json!({"command": "ls"})).await);
        assert!(p.text.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let p = payload(run(&tool(dir.path()), json!({"command": "echo oops >&2; exit 3"})).await);
        assert_eq!(p.metadata.exit_code, Some(3));
        assert!(p.text.starts_with("Command exited with code 3"));
        assert!(p.text.contains("oops"));
    }

    #[tokio::test]
    async fn test_run_command_invalid_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(
            &tool(dir.path()),
            json!({"command": "echo test", "working_dir": "does/not/exist"}),
        )
        .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ExecutionError));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(
            &tool(dir.path()),
            json!({"command": "sleep 5", "timeout_secs": 1}),
        )
        .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_run_command_caps_endless_output() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let p = payload(
            run(
                &tool(dir.path()),
                json!({"command": "yes conch", "timeout_secs": 30}),
            )
            .await,
        );

        assert!(start.elapsed() < Duration::from_secs(20));
        assert!(p.metadata.truncated);
        assert!(p.text.len() < MAX_OUTPUT_SIZE + 128);
        assert!(p.text.contains("conch\nconch\n"));
        assert!(p.text.ends_with("(output truncated)"));
    }

    #[tokio::test]
    async fn test_read_capped_stops_at_limit() {
        let data = vec![b'x'; 100];
        let (buf, cut) = read_capped(Some(&data[..]), 40).await.unwrap();
        assert_eq!(buf.len(), 40);
        assert!(cut);

        let (buf, cut) = read_capped(Some(&data[..]), 100).await.unwrap();
        assert_eq!(buf.len(), 100);
        assert!(!cut);

        let (buf, cut) = read_capped(None::<&[u8]>, 10).await.unwrap();
        assert!(buf.is_empty());
        assert!(!cut);
    }

    #[tokio::test]
    async fn test_run_command_stops_on_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        let arguments = validate(&t.descriptor(), &json!({"command": "sleep 5"})).unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let outcome = t.execute(arguments, token).await;

        assert!(outcome.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
