//! Model bridge over child-process stdio.
//!
//! Each turn is one `model/turn` request:
//!
//! ```text
//! -> {"history": [...], "tools": [{"name", "description", "inputSchema"}]}
//! <- {"content"?: "...", "toolCalls"?: [{"id", "name", "arguments"}],
//!     "usage"?: {"inputTokens", "outputTokens"}}
//! ```

use crate::plugin::{ConnectionError, PluginTransport, ProcessCommand, StdioTransport};
use crate::plugin::protocol::JsonRpcRequest;
use async_trait::async_trait;
use conch_application::{GatewayError, ModelGateway};
use conch_domain::{HistoryEntry, ModelTurn, TokenUsage, ToolCallRequest, ToolCatalog};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Method name of a model turn request
pub const MODEL_TURN: &str = "model/turn";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<TurnReply> for ModelTurn {
    fn from(reply: TurnReply) -> Self {
        ModelTurn {
            content: reply.content.filter(|c| !c.is_empty()),
            tool_calls: reply
                .tool_calls
                .into_iter()
                .map(|call| ToolCallRequest::new(call.id, call.name, decode_arguments(call.arguments)))
                .collect(),
            usage: reply.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        }
    }
}

/// Some backends send arguments as a JSON-encoded string.
fn decode_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

fn gateway_error(error: ConnectionError) -> GatewayError {
    match error {
        ConnectionError::Closed => GatewayError::TransportClosed,
        ConnectionError::Timeout => GatewayError::Timeout,
        ConnectionError::Rpc { code, message } => {
            GatewayError::RequestFailed(format!("{} (code {})", message, code))
        }
        ConnectionError::Malformed(msg) => GatewayError::InvalidResponse(msg),
        ConnectionError::Serialization(e) => GatewayError::InvalidResponse(e.to_string()),
        other => GatewayError::ConnectionError(other.to_string()),
    }
}

/// Model gateway backed by a bridge process
pub struct ProcessModelGateway {
    name: String,
    transport: Arc<dyn PluginTransport>,
    timeout: Duration,
}

impl ProcessModelGateway {
    /// Spawn the bridge process.
    ///
    /// Bare program names are looked up on `PATH` first so a missing bridge
    /// is reported before anything is spawned.
    pub fn spawn(command: &ProcessCommand, timeout: Duration) -> Result<Self, GatewayError> {
        if !command.program.contains(std::path::MAIN_SEPARATOR)
            && which::which(&command.program).is_err()
        {
            return Err(GatewayError::ConnectionError(format!(
                "model bridge '{}' not found on PATH",
                command.program
            )));
        }

        let transport = StdioTransport::spawn("model", command)
            .map_err(|e| GatewayError::ConnectionError(e.to_string()))?;
        let name = Path::new(&command.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| command.program.clone());

        info!(bridge = %name, "Model bridge started");
        Ok(Self::with_transport(name, Arc::new(transport), timeout))
    }

    /// Create a gateway with an existing transport
    pub fn with_transport(
        name: impl Into<String>,
        transport: Arc<dyn PluginTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            timeout,
        }
    }

    pub async fn close(&self) {
        self.transport.shutdown(SHUTDOWN_GRACE).await;
    }

    fn turn_params(history: &[HistoryEntry], catalog: &ToolCatalog) -> Result<Value, GatewayError> {
        let history = serde_json::to_value(history)
            .map_err(|e| GatewayError::RequestFailed(format!("cannot encode history: {}", e)))?;
        let tools: Vec<Value> = catalog
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": d.parameter_schema.to_json_schema(),
                })
            })
            .collect();
        Ok(json!({ "history": history, "tools": tools }))
    }
}

#[async_trait]
impl ModelGateway for ProcessModelGateway {
    async fn next_turn(
        &self,
        history: &[HistoryEntry],
        catalog: &ToolCatalog,
    ) -> Result<ModelTurn, GatewayError> {
        if !self.transport.is_alive() {
            return Err(GatewayError::TransportClosed);
        }

        let request = JsonRpcRequest::new(MODEL_TURN, Some(Self::turn_params(history, catalog)?));
        debug!(id = request.id, entries = history.len(), tools = catalog.len(), "Model turn");

        let value = tokio::time::timeout(self.timeout, self.transport.request(request))
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(gateway_error)?;

        let reply: TurnReply = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(reply.into())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
