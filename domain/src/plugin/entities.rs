//! Plugin entities

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stable identifier of a plugin (its key in configuration)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to launch and talk to one plugin process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    pub id: PluginId,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Trusted plugins' tools skip the confirmation prompt
    pub trust: bool,
    /// Deadline for a single `tools/call`
    pub call_timeout: Duration,
    /// Deadline for the whole capability handshake
    pub handshake_timeout: Duration,
}

impl PluginSpec {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: PluginId::new(id),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            trust: false,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_trust(mut self, trust: bool) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Lifecycle state of a plugin connection.
///
/// ```text
/// Connecting ──► Ready ──► Degraded ──► Closed
///      │           │                      ▲
///      └───────────┴──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Connecting,
    Ready,
    /// The transport failed after the handshake; calls resolve to errors
    Degraded,
    Closed,
}

impl PluginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Connecting => "connecting",
            PluginStatus::Ready => "ready",
            PluginStatus::Degraded => "degraded",
            PluginStatus::Closed => "closed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PluginStatus::Ready)
    }

    /// Whether a transition to `next` is allowed. `Closed` is terminal.
    pub fn can_transition_to(&self, next: PluginStatus) -> bool {
        use PluginStatus::*;
        matches!(
            (self, next),
            (Connecting, Ready)
                | (Connecting, Closed)
                | (Ready, Degraded)
                | (Ready, Closed)
                | (Degraded, Closed)
        )
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument of a plugin-offered prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// A prompt template offered by a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}
