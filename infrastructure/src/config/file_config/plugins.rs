//! Plugin configuration from TOML (`[plugins.<id>]` tables)

use conch_domain::{ConfigIssue, ConfigIssueCode, PluginSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// One plugin entry.
///
/// # Example
///
/// ```toml
/// [plugins.fs]
/// command = "conch-fs-plugin"
/// args = ["--root", "."]
/// trust = true
/// timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePluginConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Skip confirmation for this plugin's tools
    pub trust: bool,
    /// Deadline for one `tools/call`, in seconds
    pub timeout_secs: u64,
    /// Deadline for the capability handshake, in seconds
    pub handshake_timeout_secs: u64,
    pub enabled: bool,
}

impl Default for FilePluginConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            trust: false,
            timeout_secs: PluginSpec::DEFAULT_CALL_TIMEOUT.as_secs(),
            handshake_timeout_secs: PluginSpec::DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            enabled: true,
        }
    }
}

impl FilePluginConfig {
    pub fn to_spec(&self, id: &str) -> PluginSpec {
        let mut spec = PluginSpec::new(id, self.command.clone())
            .with_args(self.args.iter().cloned())
            .with_trust(self.trust)
            .with_call_timeout(Duration::from_secs(self.timeout_secs))
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout_secs));
        for (key, value) in &self.env {
            spec = spec.with_env(key.clone(), value.clone());
        }
        if let Some(cwd) = &self.cwd {
            spec = spec.with_cwd(cwd.clone());
        }
        spec
    }

    pub fn validate(&self, id: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.command.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyPluginCommand,
                format!("plugins.{}: command cannot be empty", id),
            ));
        }
        if self.timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroPluginTimeout,
                format!("plugins.{}: timeouts cannot be 0", id),
            ));
        }
        issues
    }
}
