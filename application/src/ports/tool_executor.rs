//! Tool executor port
//!
//! Implemented by the tool registry. The orchestrator only needs a catalog
//! snapshot and a way to run an already-validated call; name resolution,
//! validation, confirmation and timeouts stay in the application layer.

use async_trait::async_trait;
use conch_domain::{ToolCatalog, ToolDescriptor, ToolOutcome, ValidatedArguments};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ToolExecutorPort: Send + Sync {
    /// Current catalog snapshot. Later merges never alter a returned snapshot.
    fn catalog(&self) -> Arc<ToolCatalog>;

    /// Run one call.
    ///
    /// Implementations must return promptly (with
    /// [`ToolOutcome::Cancelled`]) once `cancellation` fires, and must map
    /// every failure to an outcome instead of panicking.
    async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome;
}
