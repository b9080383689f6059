//! Configuration file loading for conch
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `CONCH_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./conch.toml` or `./.conch.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/conch/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    FileConfig, FileLoggingConfig, FileModelConfig, FilePluginConfig, FileSessionConfig,
    FileToolsConfig,
};
pub use loader::{ConfigError, ConfigLoader, ConfigSource, ENV_PREFIX, PROJECT_CONFIG_FILES};
