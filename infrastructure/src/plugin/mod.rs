//! Plugin processes
//!
//! Plugins are external programs speaking JSON-RPC 2.0 over stdio with
//! `Content-Length` framing. A [`PluginClient`] owns one connection; the
//! [`PluginManager`] connects all configured plugins and keeps the
//! [`ToolRegistry`](crate::tools::ToolRegistry) in step with them.

pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod stdio;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{PluginClient, PluginEvent};
pub use error::ConnectionError;
pub use manager::{PluginFailure, PluginManager};
pub use stdio::{ProcessCommand, StdioTransport};
pub use transport::PluginTransport;
