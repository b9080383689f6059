//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Project-level config file names, checked in order
pub const PROJECT_CONFIG_FILES: [&str; 2] = ["conch.toml", ".conch.toml"];

/// Prefix of environment overrides, e.g. `CONCH_SESSION__MAX_TURNS=5`
pub const ENV_PREFIX: &str = "CONCH_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Load(#[from] Box<figment::Error>),
}

/// One entry of the source chain shown by `--show-config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub label: &'static str,
    pub location: String,
    pub found: bool,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.found { "[FOUND]" } else { "[     ]" };
        write!(f, "{} {:<9}{}", mark, format!("{}:", self.label), self.location)
    }
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `CONCH_*` environment variables (`__` separates sections)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `conch.toml` or `.conch.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/conch/config.toml`
    /// 5. Default values
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
        Self::load_from(Self::global_config_path(), project_dir, explicit)
    }

    fn load_from(
        global: Option<PathBuf>,
        project_dir: &Path,
        explicit: Option<&Path>,
    ) -> Result<FileConfig, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(project_path) = Self::project_config_path(project_dir) {
            figment = figment.merge(Toml::file(&project_path));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// `$XDG_CONFIG_HOME/conch`, home of the global config, user commands
    /// and extensions
    pub fn config_home() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("conch"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::config_home().map(|d| d.join("config.toml"))
    }

    /// The first project config file that exists in `project_dir`
    pub fn project_config_path(project_dir: &Path) -> Option<PathBuf> {
        PROJECT_CONFIG_FILES
            .iter()
            .map(|name| project_dir.join(name))
            .find(|path| path.exists())
    }

    /// The config source chain, highest priority first
    pub fn sources(project_dir: &Path, explicit: Option<&Path>) -> Vec<ConfigSource> {
        let mut sources = Vec::new();

        sources.push(ConfigSource {
            label: "Env",
            location: format!("{}*", ENV_PREFIX),
            found: std::env::vars().any(|(key, _)| key.starts_with(ENV_PREFIX)),
        });

        if let Some(path) = explicit {
            sources.push(ConfigSource {
                label: "Explicit",
                location: path.display().to_string(),
                found: path.exists(),
            });
        }

        sources.push(match Self::project_config_path(project_dir) {
            Some(path) => ConfigSource {
                label: "Project",
                location: path.display().to_string(),
                found: true,
            },
            None => ConfigSource {
                label: "Project",
                location: PROJECT_CONFIG_FILES.join(" or "),
                found: false,
            },
        });

        if let Some(path) = Self::global_config_path() {
            sources.push(ConfigSource {
                label: "Global",
                location: path.display().to_string(),
                found: path.exists(),
            });
        }

        sources.push(ConfigSource {
            label: "Default",
            location: "built-in defaults".to_string(),
            found: true,
        });

        sources
    }
}
