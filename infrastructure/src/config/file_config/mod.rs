//! Raw TOML configuration data types
//!
//! These structs mirror the config file one section per submodule. Values
//! are kept raw (strings, seconds) and converted with explicit methods so
//! that bad values become [`ConfigIssue`]s instead of parse failures.

mod logging;
mod model;
mod plugins;
mod session;
mod tools;

pub use logging::FileLoggingConfig;
pub use model::FileModelConfig;
pub use plugins::FilePluginConfig;
pub use session::FileSessionConfig;
pub use tools::FileToolsConfig;

use conch_application::ExecutionParams;
use conch_domain::{ConfigIssue, PluginSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete configuration file structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub session: FileSessionConfig,
    pub tools: FileToolsConfig,
    pub model: FileModelConfig,
    /// Plugins keyed by id
    pub plugins: BTreeMap<String, FilePluginConfig>,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Collect every issue in the configuration.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.session.validate();
        issues.extend(self.tools.validate(&crate::tools::builtin_names()));
        for (id, plugin) in self.plugins.iter().filter(|(_, p)| p.enabled) {
            issues.extend(plugin.validate(id));
        }
        issues
    }

    pub fn to_execution_params(&self, working_dir: impl Into<String>) -> ExecutionParams {
        ExecutionParams::default()
            .with_max_turns(self.session.max_turns)
            .with_max_session_tokens(self.session.max_session_tokens)
            .with_tool_timeout(self.tools.timeout())
            .with_cancel_grace(self.tools.cancel_grace())
            .with_approval_mode(self.session.parse_approval_mode().0)
            .with_working_dir(working_dir)
    }

    /// Specs for every enabled plugin, in id order
    pub fn plugin_specs(&self) -> Vec<PluginSpec> {
        self.plugins
            .iter()
            .filter(|(_, p)| p.enabled)
            .map(|(id, p)| p.to_spec(id))
            .collect()
    }

    /// Add plugins contributed by extensions. Entries already configured win.
    pub fn merge_extension_plugins(
        &mut self,
        plugins: impl IntoIterator<Item = (String, FilePluginConfig)>,
    ) {
        for (id, plugin) in plugins {
            self.plugins.entry(id).or_insert(plugin);
        }
    }
}
