//! Installed extensions.
//!
//! An extension is a directory under `$XDG_CONFIG_HOME/conch/extensions`
//! whose manifest contributes prompt commands and plugin entries:
//!
//! ```toml
//! name = "Acme tools"
//! description = "Deploy helpers"
//!
//! [[commands]]
//! name = "deploy"
//! description = "Plan a deployment"
//! prompt = "Plan a deployment of {{args}}."
//!
//! [plugins.acme]
//! command = "./bin/acme-plugin"
//! ```
//!
//! The directory name is the extension id, used as the command origin and
//! as the rename prefix on collisions.

use super::prompt_command;
use crate::config::{ConfigLoader, FilePluginConfig};
use conch_application::{CommandLoad, CommandSource};
use conch_domain::{CommandOrigin, ConfigIssue, ConfigIssueCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Manifest file name inside an extension directory
pub const EXTENSION_MANIFEST: &str = "conch-extension.toml";

#[derive(Debug, Clone, Deserialize)]
struct ManifestCommand {
    name: String,
    #[serde(default)]
    description: String,
    prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ExtensionManifest {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    commands: Vec<ManifestCommand>,
    #[serde(default)]
    plugins: BTreeMap<String, FilePluginConfig>,
}

/// A parsed extension
#[derive(Debug, Clone)]
pub struct Extension {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dir: PathBuf,
    commands: Vec<ManifestCommand>,
    plugins: BTreeMap<String, FilePluginConfig>,
}

impl Extension {
    fn load(dir: &Path, id: String) -> Result<Self, String> {
        let manifest_path = dir.join(EXTENSION_MANIFEST);
        let text = fs::read_to_string(&manifest_path).map_err(|e| e.to_string())?;
        let manifest: ExtensionManifest = toml::from_str(&text).map_err(|e| e.to_string())?;

        let plugins = manifest
            .plugins
            .into_iter()
            .map(|(plugin_id, plugin)| (plugin_id, Self::anchor(dir, plugin)))
            .collect();

        Ok(Self {
            name: manifest.name.unwrap_or_else(|| id.clone()),
            id,
            description: manifest.description,
            dir: dir.to_path_buf(),
            commands: manifest.commands,
            plugins,
        })
    }

    /// Resolve `./`-relative commands and relative cwds against the
    /// extension directory
    fn anchor(dir: &Path, mut plugin: FilePluginConfig) -> FilePluginConfig {
        if plugin.command.starts_with("./") || plugin.command.starts_with("../") {
            plugin.command = dir.join(&plugin.command).to_string_lossy().into_owned();
        }
        if let Some(cwd) = &plugin.cwd
            && cwd.is_relative()
        {
            plugin.cwd = Some(dir.join(cwd));
        }
        plugin
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn plugin_ids(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }
}

/// Every extension found in one directory
#[derive(Debug, Default)]
pub struct ExtensionSource {
    extensions: Vec<Extension>,
    issues: Vec<ConfigIssue>,
}

impl ExtensionSource {
    /// Scan `dir` for extension directories, in name order.
    ///
    /// A missing `dir` yields no extensions. Directories without a
    /// manifest are ignored; unreadable manifests become warnings.
    pub fn discover(dir: &Path) -> Self {
        let mut source = Self::default();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), "No extensions: {}", e);
                return source;
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir() && path.join(EXTENSION_MANIFEST).exists())
            .collect();
        dirs.sort();

        for path in dirs {
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            match Extension::load(&path, id.clone()) {
                Ok(extension) => {
                    debug!(
                        extension = %extension.id,
                        commands = extension.commands.len(),
                        plugins = extension.plugins.len(),
                        "Loaded extension"
                    );
                    source.extensions.push(extension);
                }
                Err(e) => {
                    warn!(extension = %id, "Invalid extension manifest: {}", e);
                    source.issues.push(ConfigIssue::warning(
                        ConfigIssueCode::InvalidExtension,
                        format!("extension '{}': {}", id, e),
                    ));
                }
            }
        }
        source
    }

    /// `$XDG_CONFIG_HOME/conch/extensions`
    pub fn default_dir() -> Option<PathBuf> {
        ConfigLoader::config_home().map(|home| home.join("extensions"))
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Plugin entries contributed by all extensions.
    ///
    /// When two extensions declare the same plugin id, the first in name
    /// order is kept.
    pub fn plugins(&self) -> Vec<(String, FilePluginConfig)> {
        let mut seen = BTreeMap::new();
        for extension in &self.extensions {
            for (id, plugin) in &extension.plugins {
                seen.entry(id.clone()).or_insert_with(|| plugin.clone());
            }
        }
        seen.into_iter().collect()
    }
}

impl CommandSource for ExtensionSource {
    fn name(&self) -> &str {
        "extensions"
    }

    fn load(&self) -> CommandLoad {
        let commands = self
            .extensions
            .iter()
            .flat_map(|extension| {
                extension.commands.iter().map(|command| {
                    prompt_command(
                        command.name.clone(),
                        command.description.clone(),
                        CommandOrigin::Extension(extension.id.clone()),
                        command.prompt.clone(),
                    )
                })
            })
            .collect();
        CommandLoad {
            commands,
            issues: self.issues.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conch_domain::{CommandContext, CommandInvocation, FollowUp};

    fn install(root: &Path, id: &str, manifest: &str) -> PathBuf {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(EXTENSION_MANIFEST), manifest).unwrap();
        dir
    }

    const ACME: &str = r#"
name = "Acme tools"

[[commands]]
name = "deploy"
description = "Plan a deployment"
prompt = "Plan a deployment of {{args}}."

[plugins.acme]
command = "./bin/acme-plugin"
cwd = "data"
trust = true
"#;

    #[test]
    fn test_missing_directory_has_no_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let source = ExtensionSource::discover(&dir.path().join("nope"));
        assert!(source.extensions().is_empty());
        assert!(source.load().commands.is_empty());
    }

    #[test]
    fn test_manifest_commands_carry_extension_origin() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "acme", ACME);

        let source = ExtensionSource::discover(dir.path());
        let load = source.load();

        assert_eq!(source.extensions()[0].name, "Acme tools");
        assert_eq!(source.extensions()[0].command_names(), vec!["deploy"]);
        assert_eq!(load.commands.len(), 1);
        let deploy = &load.commands[0];
        assert_eq!(deploy.origin, CommandOrigin::Extension("acme".to_string()));

        let action = deploy.action.as_ref().unwrap();
        let result = action(
            &CommandInvocation::new(vec!["deploy".into()], "staging"),
            &CommandContext::default(),
        );
        assert_eq!(
            result.follow_up,
            Some(FollowUp::SubmitPrompt("Plan a deployment of staging.".to_string()))
        );
    }

    #[test]
    fn test_plugin_paths_are_anchored_to_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let ext_dir = install(dir.path(), "acme", ACME);

        let source = ExtensionSource::discover(dir.path());
        let plugins = source.plugins();

        assert_eq!(plugins.len(), 1);
        let (id, plugin) = &plugins[0];
        assert_eq!(id, "acme");
        assert_eq!(
            PathBuf::from(&plugin.command),
            ext_dir.join("./bin/acme-plugin")
        );
        assert_eq!(plugin.cwd, Some(ext_dir.join("data")));
        assert!(plugin.trust);
    }

    #[test]
    fn test_first_extension_wins_plugin_id() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "alpha", "[plugins.shared]\ncommand = \"alpha-bin\"\n");
        install(dir.path(), "beta", "[plugins.shared]\ncommand = \"beta-bin\"\n");

        let plugins = ExtensionSource::discover(dir.path()).plugins();

        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].1.command, "alpha-bin");
    }

    #[test]
    fn test_invalid_manifest_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "acme", ACME);
        install(dir.path(), "broken", "[[commands]]\nname = \"x\"\n");
        fs::create_dir_all(dir.path().join("not-an-extension")).unwrap();

        let source = ExtensionSource::discover(dir.path());
        let load = source.load();

        assert_eq!(source.extensions().len(), 1);
        assert_eq!(load.issues.len(), 1);
        assert_eq!(load.issues[0].code, ConfigIssueCode::InvalidExtension);
        assert!(load.issues[0].message.contains("broken"));
    }
}
