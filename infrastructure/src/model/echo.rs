//! Fallback gateway used when no model bridge is configured.

use async_trait::async_trait;
use conch_application::{GatewayError, ModelGateway};
use conch_domain::{EntryBody, HistoryEntry, ModelTurn, Role, ToolCatalog};

/// Answers every prompt by repeating it. Never requests tools.
#[derive(Debug, Default)]
pub struct EchoModelGateway;

impl EchoModelGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelGateway for EchoModelGateway {
    async fn next_turn(
        &self,
        history: &[HistoryEntry],
        _catalog: &ToolCatalog,
    ) -> Result<ModelTurn, GatewayError> {
        let last_prompt = history.iter().rev().find_map(|entry| match (&entry.role, &entry.body) {
            (Role::User, EntryBody::Content { text }) => Some(text.as_str()),
            _ => None,
        });
        let reply = match last_prompt {
            Some(text) => format!("(no model configured) {}", text),
            None => "(no model configured)".to_string(),
        };
        Ok(ModelTurn::content(reply))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
