//! Model bridge configuration from TOML (`[model]` section)

use crate::plugin::ProcessCommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Raw model bridge configuration from TOML
///
/// Without a `command` the shell runs with the echo gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileModelConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Deadline for one model turn, in seconds
    pub timeout_secs: u64,
}

impl Default for FileModelConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_secs: 300,
        }
    }
}

impl FileModelConfig {
    pub fn to_process_command(&self) -> Option<ProcessCommand> {
        let program = self.command.as_deref().map(str::trim)?;
        if program.is_empty() {
            return None;
        }
        let mut command = ProcessCommand::new(program).with_args(self.args.clone());
        command.env = self.env.clone();
        Some(command)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
