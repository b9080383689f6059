//! Plugin domain: identity, launch spec and connection state of external
//! tool-provider processes.

pub mod entities;

pub use entities::{PluginId, PluginSpec, PluginStatus, PromptArgument, PromptDescriptor};
