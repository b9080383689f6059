//! Tool implementations and the tool registry
//!
//! - [`builtin`]: the [`BuiltinTool`] trait and the default tool set
//! - [`file`], [`command`], [`search`]: the built-in tools themselves
//! - `web`: `web_fetch`, with the `web-tools` feature
//! - [`ToolRegistry`]: the session namespace, routing calls to built-ins
//!   or plugins

pub mod builtin;
pub mod command;
pub mod file;
pub mod search;

#[cfg(feature = "web-tools")]
pub mod web;

mod registry;

pub use builtin::{BuiltinTool, Workspace, builtin_names, default_tools};
pub use registry::{MergeReport, RejectedTool, ToolRegistry};
