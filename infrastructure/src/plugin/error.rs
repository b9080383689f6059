//! Error types for plugin connections

use std::time::Duration;
use thiserror::Error;

/// Result type alias for plugin operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Errors that can occur when connecting to or talking with a plugin process
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to spawn plugin process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Transport closed")]
    Closed,

    #[error("Request timeout")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConnectionError {
    /// Whether the transport itself is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Closed | ConnectionError::Io(_) | ConnectionError::Spawn { .. }
        )
    }
}
