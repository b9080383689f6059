//! Connection to one plugin process.
//!
//! A [`PluginClient`] performs the capability handshake, keeps the offered
//! tools and prompts, and turns `tools/call` round trips into
//! [`ToolOutcome`]s. Its status follows the [`PluginStatus`] state machine
//! and every transition is broadcast as a [`PluginEvent`].

use crate::plugin::error::{ConnectionError, Result};
use crate::plugin::protocol::{
    CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcNotification,
    PROTOCOL_VERSION, PromptsListResult, RemoteTool, ToolsListResult, methods,
};
use crate::plugin::stdio::{ProcessCommand, StdioTransport};
use crate::plugin::transport::PluginTransport;
use conch_domain::{
    ErrorKind, ParameterSchema, PayloadMetadata, PluginId, PluginSpec, PluginStatus,
    PromptDescriptor, ToolDescriptor, ToolOutcome, ToolPayload,
};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Grace period for `shutdown` before the process is killed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Upper bound for best-effort notifications sent on the way out
const NOTIFY_TIMEOUT: Duration = Duration::from_millis(500);

/// Change notifications published by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    StatusChanged { id: PluginId, status: PluginStatus },
    /// The offered tool list was re-fetched
    ToolsChanged { id: PluginId },
}

struct ClientState {
    status: PluginStatus,
    tools: Vec<Arc<ToolDescriptor>>,
    prompts: Vec<PromptDescriptor>,
    server_name: Option<String>,
}

pub struct PluginClient {
    spec: PluginSpec,
    transport: Arc<dyn PluginTransport>,
    state: RwLock<ClientState>,
    events: broadcast::Sender<PluginEvent>,
}

impl PluginClient {
    /// Spawn the plugin process described by `spec` and complete the handshake.
    pub async fn connect(spec: PluginSpec) -> Result<Arc<Self>> {
        let transport = StdioTransport::spawn(spec.id.as_str(), &ProcessCommand::from(&spec))?;
        Self::connect_with(spec, Arc::new(transport)).await
    }

    /// Complete the handshake over an existing transport.
    ///
    /// On failure the transport is shut down and the error returned; the
    /// caller decides whether that is fatal.
    pub async fn connect_with(
        spec: PluginSpec,
        transport: Arc<dyn PluginTransport>,
    ) -> Result<Arc<Self>> {
        let (events, _) = broadcast::channel(32);
        let handshake_timeout = spec.handshake_timeout;
        let client = Arc::new(Self {
            spec,
            transport,
            state: RwLock::new(ClientState {
                status: PluginStatus::Connecting,
                tools: Vec::new(),
                prompts: Vec::new(),
                server_name: None,
            }),
            events,
        });

        let outcome = match tokio::time::timeout(handshake_timeout, client.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::HandshakeTimeout(handshake_timeout)),
        };
        if let Err(e) = outcome {
            warn!(plugin = %client.id(), "Handshake failed: {}", e);
            client.set_status(PluginStatus::Closed);
            client.transport.shutdown(SHUTDOWN_GRACE).await;
            return Err(e);
        }

        client.set_status(PluginStatus::Ready);
        client.spawn_notification_pump();
        Ok(client)
    }

    async fn handshake(&self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::conch())?;
        let result = self
            .transport
            .request(JsonRpcRequest::new(methods::INITIALIZE, Some(params)))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ConnectionError::Malformed(format!("initialize result: {}", e)))?;
        if init.protocol_version != PROTOCOL_VERSION {
            return Err(ConnectionError::ProtocolMismatch(format!(
                "plugin speaks {}, expected {}",
                init.protocol_version, PROTOCOL_VERSION
            )));
        }

        self.transport.notify(methods::INITIALIZED, None).await?;

        let tools = self.list_tools().await?;
        let prompts = self.list_prompts().await;
        let server_name = init.server_info.map(|s| s.name);

        info!(
            plugin = %self.id(),
            server = server_name.as_deref().unwrap_or("unknown"),
            tools = tools.len(),
            prompts = prompts.len(),
            "Plugin handshake complete"
        );

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.tools = tools;
        state.prompts = prompts;
        state.server_name = server_name;
        Ok(())
    }

    /// Fetch every page of `tools/list`
    async fn list_tools(&self) -> Result<Vec<Arc<ToolDescriptor>>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let result = self
                .transport
                .request(JsonRpcRequest::new(methods::TOOLS_LIST, params))
                .await?;
            let page: ToolsListResult = serde_json::from_value(result)
                .map_err(|e| ConnectionError::Malformed(format!("tools/list result: {}", e)))?;
            tools.extend(page.tools.into_iter().filter_map(|t| self.to_descriptor(t)));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Prompts are optional; a plugin that does not serve them offers none
    async fn list_prompts(&self) -> Vec<PromptDescriptor> {
        let mut prompts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let page = match self
                .transport
                .request(JsonRpcRequest::new(methods::PROMPTS_LIST, params))
                .await
                .and_then(|v| {
                    serde_json::from_value::<PromptsListResult>(v).map_err(ConnectionError::from)
                }) {
                Ok(page) => page,
                Err(e) => {
                    debug!(plugin = %self.id(), "prompts/list unavailable: {}", e);
                    break;
                }
            };
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        prompts
    }

    fn to_descriptor(&self, tool: RemoteTool) -> Option<Arc<ToolDescriptor>> {
        if !ToolDescriptor::is_valid_name(&tool.name) {
            warn!(plugin = %self.id(), tool = %tool.name, "Skipping tool with invalid name");
            return None;
        }
        let schema = if tool.input_schema.is_object() {
            ParameterSchema::from_json_schema(&tool.input_schema)
        } else {
            ParameterSchema::from_json_schema(&json!({"type": "object"}))
        };
        Some(Arc::new(
            ToolDescriptor::plugin(self.spec.id.clone(), tool.name, tool.description)
                .with_schema(schema)
                .with_confirmation(!self.spec.trust),
        ))
    }

    /// Invoke `tool` on the plugin.
    ///
    /// Never fails: transport problems become `Error` outcomes. Cancellation
    /// returns `Cancelled` at once and tells the plugin in the background.
    pub async fn call(
        &self,
        tool: &str,
        arguments: Value,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        let status = self.status();
        if !status.is_ready() {
            return ToolOutcome::error(
                ErrorKind::ConnectionError,
                format!("Plugin '{}' is {}", self.id(), status),
            );
        }
        if !self.transport.is_alive() {
            self.mark_degraded("transport closed");
            return ToolOutcome::error(
                ErrorKind::ConnectionError,
                format!("Plugin '{}' is no longer running", self.id()),
            );
        }

        let request = JsonRpcRequest::new(
            methods::TOOLS_CALL,
            Some(json!({"name": tool, "arguments": arguments})),
        );
        let request_id = request.id;
        debug!(plugin = %self.id(), tool, request_id, "Calling plugin tool");

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                self.send_cancelled(request_id, "cancelled by user");
                ToolOutcome::cancelled("cancelled by user")
            }
            _ = tokio::time::sleep(self.spec.call_timeout) => {
                self.send_cancelled(request_id, "timeout");
                ToolOutcome::error(
                    ErrorKind::Timeout,
                    format!(
                        "Plugin '{}' did not answer within {}s",
                        self.id(),
                        self.spec.call_timeout.as_secs_f64()
                    ),
                )
            }
            result = self.transport.request(request) => self.map_call_result(tool, result),
        }
    }

    fn map_call_result(&self, tool: &str, result: Result<Value>) -> ToolOutcome {
        match result {
            Ok(value) => match serde_json::from_value::<CallToolResult>(value) {
                Ok(call) if call.is_error => ToolOutcome::execution_error(call.text()),
                Ok(call) => {
                    let text = call.text();
                    let bytes = text.len();
                    ToolOutcome::Success(ToolPayload::text(text).with_metadata(PayloadMetadata {
                        bytes: Some(bytes),
                        ..Default::default()
                    }))
                }
                Err(e) => ToolOutcome::error(
                    ErrorKind::ConnectionError,
                    format!("Malformed tools/call result from '{}': {}", self.id(), e),
                ),
            },
            Err(ConnectionError::Rpc { code, message }) => ToolOutcome::execution_error(format!(
                "Plugin '{}' rejected {} ({}): {}",
                self.id(),
                tool,
                code,
                message
            )),
            Err(e) => {
                if e.is_fatal() {
                    self.mark_degraded(&e.to_string());
                }
                ToolOutcome::error(
                    ErrorKind::ConnectionError,
                    format!("Plugin '{}': {}", self.id(), e),
                )
            }
        }
    }

    fn send_cancelled(&self, request_id: u64, reason: &'static str) {
        let transport = Arc::clone(&self.transport);
        let plugin = self.id().clone();
        tokio::spawn(async move {
            let params = json!({"requestId": request_id, "reason": reason});
            let sent = tokio::time::timeout(
                NOTIFY_TIMEOUT,
                transport.notify(methods::CANCELLED, Some(params)),
            )
            .await;
            if !matches!(sent, Ok(Ok(()))) {
                debug!(plugin = %plugin, request_id, "Cancellation notice not delivered");
            }
        });
    }

    /// Shut the plugin down. Safe to call more than once.
    pub async fn close(&self) {
        if !self.set_status(PluginStatus::Closed) {
            return;
        }
        info!(plugin = %self.id(), "Closing plugin");
        self.transport.shutdown(SHUTDOWN_GRACE).await;
    }

    pub fn id(&self) -> &PluginId {
        &self.spec.id
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    pub fn status(&self) -> PluginStatus {
        self.state.read().unwrap_or_else(|e| e.into_inner()).status
    }

    pub fn tools(&self) -> Vec<Arc<ToolDescriptor>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .tools
            .clone()
    }

    pub fn prompts(&self) -> Vec<PromptDescriptor> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .prompts
            .clone()
    }

    pub fn server_name(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .server_name
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    /// Apply a transition if the state machine allows it
    fn set_status(&self, next: PluginStatus) -> bool {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if !state.status.can_transition_to(next) {
                return false;
            }
            state.status = next;
        }
        debug!(plugin = %self.id(), status = %next, "Plugin status changed");
        let _ = self.events.send(PluginEvent::StatusChanged {
            id: self.spec.id.clone(),
            status: next,
        });
        true
    }

    fn mark_degraded(&self, reason: &str) {
        if self.set_status(PluginStatus::Degraded) {
            warn!(plugin = %self.id(), reason, "Plugin degraded");
        }
    }

    fn spawn_notification_pump(self: &Arc<Self>) {
        let Some(mut rx) = self.transport.take_notifications() else {
            return;
        };
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let Some(client) = weak.upgrade() else { return };
                client.handle_notification(notification).await;
            }
            if let Some(client) = weak.upgrade() {
                client.mark_degraded("transport closed");
            }
        });
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::TOOLS_LIST_CHANGED => match self.list_tools().await {
                Ok(tools) => {
                    info!(plugin = %self.id(), tools = tools.len(), "Plugin tool list changed");
                    self.state.write().unwrap_or_else(|e| e.into_inner()).tools = tools;
                    let _ = self.events.send(PluginEvent::ToolsChanged {
                        id: self.spec.id.clone(),
                    });
                }
                Err(e) => warn!(plugin = %self.id(), "Failed to re-list tools: {}", e),
            },
            other => debug!(plugin = %self.id(), method = other, "Ignoring notification"),
        }
    }
}
