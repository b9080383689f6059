//! Infrastructure layer for conch
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: the tool registry and built-in tools, plugin
//! processes, the model bridge, on-disk command loaders, configuration
//! file loading and conversation recording.

pub mod commands;
pub mod config;
pub mod logging;
pub mod model;
pub mod plugin;
pub mod tools;

// Re-export commonly used types
pub use commands::{ExtensionSource, FileCommandSource, render_prompt};
pub use config::{ConfigError, ConfigLoader, ConfigSource, FileConfig, FilePluginConfig};
pub use logging::JsonlConversationRecorder;
pub use model::{EchoModelGateway, ProcessModelGateway};
pub use plugin::{
    ConnectionError, PluginClient, PluginEvent, PluginFailure, PluginManager, ProcessCommand,
};
pub use tools::{BuiltinTool, MergeReport, ToolRegistry, Workspace, builtin_names, default_tools};
