//! Command source port
//!
//! Loaders (filesystem, extension manifests, built-in tables) yield plain
//! [`CommandDescriptor`] data for one or more origin tiers. The resolver
//! never touches storage itself.

use conch_domain::{CommandDescriptor, ConfigIssue};

/// Descriptors and load problems from one source
#[derive(Debug, Default)]
pub struct CommandLoad {
    pub commands: Vec<CommandDescriptor>,
    pub issues: Vec<ConfigIssue>,
}

impl CommandLoad {
    pub fn new(commands: Vec<CommandDescriptor>) -> Self {
        Self {
            commands,
            issues: Vec::new(),
        }
    }
}

pub trait CommandSource: Send + Sync {
    /// Human-readable name for diagnostics (e.g. "user commands")
    fn name(&self) -> &str;

    fn load(&self) -> CommandLoad;
}
