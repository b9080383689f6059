//! Model gateway port
//!
//! Defines the interface for asking the language-model backend for its next
//! turn. Concrete model protocols live in infrastructure adapters.

use async_trait::async_trait;
use conch_domain::{HistoryEntry, ModelTurn, ToolCatalog};
use thiserror::Error;

/// Errors that can occur while talking to the model backend
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Transport closed")]
    TransportClosed,
}

/// Gateway for model communication
///
/// Given the full history and the turn's tool catalog, returns either
/// content or tool-call requests. Implementations must treat the catalog as
/// the complete list of callable tools for that turn.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn next_turn(
        &self,
        history: &[HistoryEntry],
        catalog: &ToolCatalog,
    ) -> Result<ModelTurn, GatewayError>;

    /// Short name shown in the UI and logs
    fn name(&self) -> &str {
        "model"
    }
}
