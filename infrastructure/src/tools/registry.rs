//! Tool Registry
//!
//! The [`ToolRegistry`] owns the session's tool namespace and implements
//! [`ToolExecutorPort`]. Built-in tools are registered once at startup;
//! plugin tools are merged and removed as connections come and go.
//!
//! # Snapshots
//!
//! Readers get an `Arc<ToolCatalog>`. Every change builds a new catalog and
//! swaps it in under the lock, so a conversation turn keeps working on the
//! snapshot it took even while a plugin is being merged or dropped. Catalog
//! order is built-ins in registration order, then plugin tools in merge order.
//!
//! # Collisions
//!
//! Names are never shadowed or renamed. A plugin tool whose name is already
//! taken is rejected, logged at `warn`, and listed in the [`MergeReport`].

use crate::plugin::PluginClient;
use crate::tools::builtin::BuiltinTool;
use async_trait::async_trait;
use conch_application::ToolExecutorPort;
use conch_domain::{
    DomainError, ErrorKind, PluginId, ToolCatalog, ToolDescriptor, ToolOutcome, ToolSource,
    ValidatedArguments,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A plugin tool that was not merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedTool {
    pub name: String,
    pub reason: String,
}

/// What happened to each tool a plugin offered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub plugin: PluginId,
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedTool>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} tool(s) merged",
            self.plugin,
            self.accepted.len()
        )?;
        for rejected in &self.rejected {
            write!(f, ", {} rejected ({})", rejected.name, rejected.reason)?;
        }
        Ok(())
    }
}

struct MergedPlugin {
    id: PluginId,
    client: Weak<PluginClient>,
    tools: Vec<Arc<ToolDescriptor>>,
}

#[derive(Default)]
struct RegistryState {
    builtin_order: Vec<Arc<ToolDescriptor>>,
    builtins: HashMap<String, Arc<dyn BuiltinTool>>,
    /// In merge order
    plugins: Vec<MergedPlugin>,
    catalog: Arc<ToolCatalog>,
}

impl RegistryState {
    fn owner_of(&self, name: &str) -> Option<String> {
        if self.builtins.contains_key(name) {
            return Some("built-in tool".to_string());
        }
        self.plugins
            .iter()
            .find(|p| p.tools.iter().any(|t| t.name == name))
            .map(|p| format!("tool from plugin '{}'", p.id))
    }

    fn rebuild(&mut self) {
        let mut catalog = ToolCatalog::new();
        let plugin_tools = self.plugins.iter().flat_map(|p| p.tools.iter());
        for descriptor in self.builtin_order.iter().chain(plugin_tools) {
            if let Err(e) = catalog.push(Arc::clone(descriptor)) {
                warn!(tool = %descriptor.name, "Skipping tool while rebuilding catalog: {}", e);
            }
        }
        self.catalog = Arc::new(catalog);
    }
}

/// Tool registry shared by the session
#[derive(Default)]
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in tool.
    pub fn register(&self, tool: Box<dyn BuiltinTool>) -> Result<(), DomainError> {
        let descriptor = Arc::new(tool.descriptor());
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(owner) = state.owner_of(&descriptor.name) {
            debug!(tool = %descriptor.name, owner = %owner, "Duplicate built-in registration");
            return Err(DomainError::duplicate_tool(&descriptor.name));
        }
        debug!(tool = %descriptor.name, "Registered built-in tool");
        state
            .builtins
            .insert(descriptor.name.clone(), Arc::from(tool));
        state.builtin_order.push(descriptor);
        state.rebuild();
        Ok(())
    }

    /// Add the tools of a ready plugin.
    ///
    /// Merging a plugin that is already present replaces its previous tools.
    pub fn merge_plugin(&self, client: &Arc<PluginClient>) -> MergeReport {
        let id = client.id().clone();
        let offered = client.tools();
        let mut report = MergeReport {
            plugin: id.clone(),
            accepted: Vec::new(),
            rejected: Vec::new(),
        };

        let status = client.status();
        if !status.is_ready() {
            report.rejected = offered
                .iter()
                .map(|t| RejectedTool {
                    name: t.name.clone(),
                    reason: format!("plugin is {}", status),
                })
                .collect();
            warn!(plugin = %id, status = %status, "Not merging tools of a plugin that is not ready");
            return report;
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.plugins.retain(|p| p.id != id);

        let mut accepted: Vec<Arc<ToolDescriptor>> = Vec::new();
        for descriptor in offered {
            let reason = if descriptor.source != ToolSource::Plugin(id.clone()) {
                Some(format!("descriptor source is {}", descriptor.source))
            } else if accepted.iter().any(|t| t.name == descriptor.name) {
                Some("offered twice by the same plugin".to_string())
            } else {
                state
                    .owner_of(&descriptor.name)
                    .map(|owner| format!("collides with {}", owner))
            };

            match reason {
                Some(reason) => {
                    warn!(plugin = %id, tool = %descriptor.name, reason = %reason, "Rejected plugin tool");
                    report.rejected.push(RejectedTool {
                        name: descriptor.name.clone(),
                        reason,
                    });
                }
                None => {
                    report.accepted.push(descriptor.name.clone());
                    accepted.push(descriptor);
                }
            }
        }

        state.plugins.push(MergedPlugin {
            id: id.clone(),
            client: Arc::downgrade(client),
            tools: accepted,
        });
        state.rebuild();
        info!(
            plugin = %id,
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Merged plugin tools"
        );
        report
    }

    /// Drop every tool of plugin `id`. Returns how many were removed.
    pub fn remove_plugin(&self, id: &PluginId) -> usize {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(index) = state.plugins.iter().position(|p| &p.id == id) else {
            return 0;
        };
        let removed = state.plugins.remove(index).tools.len();
        state.rebuild();
        info!(plugin = %id, tools = removed, "Removed plugin tools");
        removed
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.catalog().lookup(name).cloned()
    }

    /// The current frozen catalog
    pub fn catalog(&self) -> Arc<ToolCatalog> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&state.catalog)
    }

    /// Live plugin clients in merge order
    pub fn plugins(&self) -> Vec<Arc<PluginClient>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.plugins.iter().filter_map(|p| p.client.upgrade()).collect()
    }

    fn builtin(&self, name: &str) -> Option<Arc<dyn BuiltinTool>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.builtins.get(name).cloned()
    }

    fn plugin_client(&self, id: &PluginId) -> Option<Arc<PluginClient>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .plugins
            .iter()
            .find(|p| &p.id == id)
            .and_then(|p| p.client.upgrade())
    }
}

#[async_trait]
impl ToolExecutorPort for ToolRegistry {
    fn catalog(&self) -> Arc<ToolCatalog> {
        ToolRegistry::catalog(self)
    }

    async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        match &descriptor.source {
            ToolSource::BuiltIn => match self.builtin(&descriptor.name) {
                Some(tool) => tool.execute(arguments, cancellation).await,
                None => ToolOutcome::error(
                    ErrorKind::ToolNotFound,
                    format!("Built-in tool '{}' is not registered", descriptor.name),
                ),
            },
            ToolSource::Plugin(id) => match self.plugin_client(id) {
                Some(client) => {
                    client
                        .call(&descriptor.name, arguments.into_value(), cancellation)
                        .await
                }
                None => ToolOutcome::error(
                    ErrorKind::ConnectionError,
                    format!("Plugin '{}' is no longer connected", id),
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::protocol::methods;
    use crate::plugin::testing::{FakeReply, FakeTransport};
    use crate::tools::builtin::cancellable;
    use conch_application::{
        AutoApprove, BatchSettings, ExecuteBatchUseCase, NoSessionObserver,
    };
    use conch_domain::{
        ParamType, ParameterSpec, PluginSpec, ToolCallRequest, ToolPayload, validate,
    };
    use serde_json::{Value, json};
    use std::time::{Duration, Instant};

    struct StaticTool(&'static str);

    #[async_trait]
    impl BuiltinTool for StaticTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::builtin(self.0, "static")
        }

        async fn execute(&self, _: ValidatedArguments, _: CancellationToken) -> ToolOutcome {
            ToolOutcome::Success(ToolPayload::text(format!("{} ran", self.0)))
        }
    }

    /// Sleeps for `secs` unless cancelled
    struct SleepTool;

    #[async_trait]
    impl BuiltinTool for SleepTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::builtin("sleep", "Sleep")
                .with_parameter(ParameterSpec::required("secs", "Seconds", ParamType::Integer))
        }

        async fn execute(&self, args: ValidatedArguments, cancel: CancellationToken) -> ToolOutcome {
            let secs = args.get_u64("secs").unwrap_or(1);
            cancellable(&cancel, async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                ToolOutcome::Success(ToolPayload::text("woke up"))
            })
            .await
        }
    }

    fn tool(name: &str) -> Value {
        json!({"name": name, "inputSchema": {"type": "object"}})
    }

    async fn plugin(id: &str, tools: Value) -> (Arc<PluginClient>, Arc<FakeTransport>) {
        let fake = Arc::new(FakeTransport::serving(tools));
        let client = PluginClient::connect_with(PluginSpec::new(id, "fake"), fake.clone())
            .await
            .unwrap();
        (client, fake)
    }

    #[test]
    fn test_duplicate_builtin_is_rejected() {
        let registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool("read_file"))).unwrap();

        let err = registry
            .register(Box::new(StaticTool("read_file")))
            .unwrap_err();

        assert_eq!(err, DomainError::duplicate_tool("read_file"));
        assert_eq!(registry.catalog().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_rejects_collisions_without_renaming() {
        let registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool("read_file"))).unwrap();
        let (fs, _) = plugin("fs", json!([tool("read_file"), tool("list_dir")])).await;
        let (git, _) = plugin("git", json!([tool("list_dir"), tool("git_log")])).await;

        let fs_report = registry.merge_plugin(&fs);
        let git_report = registry.merge_plugin(&git);

        assert_eq!(fs_report.accepted, vec!["list_dir"]);
        assert_eq!(fs_report.rejected.len(), 1);
        assert_eq!(fs_report.rejected[0].name, "read_file");
        assert!(fs_report.rejected[0].reason.contains("built-in"));

        assert_eq!(git_report.accepted, vec!["git_log"]);
        assert!(git_report.rejected[0].reason.contains("plugin 'fs'"));

        assert_eq!(
            registry.catalog().names(),
            vec!["read_file", "list_dir", "git_log"]
        );
        assert_eq!(
            registry.lookup("list_dir").unwrap().source,
            ToolSource::Plugin(PluginId::new("fs"))
        );
    }

    #[tokio::test]
    async fn test_remove_swaps_catalog_atomically() {
        let registry = ToolRegistry::new();
        let (fs, _) = plugin("fs", json!([tool("list_dir"), tool("stat")])).await;
        registry.merge_plugin(&fs);
        let before = registry.catalog();

        assert_eq!(registry.remove_plugin(&PluginId::new("fs")), 2);

        assert_eq!(before.len(), 2);
        assert!(registry.catalog().is_empty());
        assert_eq!(registry.remove_plugin(&PluginId::new("fs")), 0);
    }

    #[tokio::test]
    async fn test_remerge_replaces_previous_tools() {
        let registry = ToolRegistry::new();
        let (fs, fake) = plugin("fs", json!([tool("list_dir")])).await;
        registry.merge_plugin(&fs);

        let mut events = fs.subscribe();
        fake.set_reply(methods::TOOLS_LIST, FakeReply::Result(json!({"tools": [tool("tree")]})));
        fake.emit(methods::TOOLS_LIST_CHANGED);
        let _ = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
        let report = registry.merge_plugin(&fs);

        assert!(report.is_clean());
        assert_eq!(registry.catalog().names(), vec!["tree"]);
    }

    #[tokio::test]
    async fn test_execute_routes_by_source() {
        let registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool("local"))).unwrap();
        let (fs, fake) = plugin("fs", json!([tool("list_dir")])).await;
        registry.merge_plugin(&fs);
        fake.set_reply(
            methods::TOOLS_CALL,
            FakeReply::Result(json!({"content": [{"type": "text", "text": "remote ran"}]})),
        );

        let local = registry.lookup("local").unwrap();
        let remote = registry.lookup("list_dir").unwrap();
        let local_out = ToolExecutorPort::execute(
            &registry,
            &local,
            validate(&local, &json!({})).unwrap(),
            CancellationToken::new(),
        )
        .await;
        let remote_out = ToolExecutorPort::execute(
            &registry,
            &remote,
            validate(&remote, &json!({"x": 1})).unwrap(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(local_out.model_text(), "local ran");
        assert_eq!(remote_out.model_text(), "remote ran");
        let call = fake.requests(methods::TOOLS_CALL)[0].clone().unwrap();
        assert_eq!(call["arguments"], json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_dropped_plugin_resolves_to_connection_error() {
        let registry = ToolRegistry::new();
        let (fs, _) = plugin("fs", json!([tool("list_dir")])).await;
        registry.merge_plugin(&fs);
        let descriptor = registry.lookup("list_dir").unwrap();
        drop(fs);

        let outcome = ToolExecutorPort::execute(
            &registry,
            &descriptor,
            ValidatedArguments::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::ConnectionError));
    }

    #[tokio::test]
    async fn test_batch_cancellation_reaches_builtin_and_plugin() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Box::new(SleepTool)).unwrap();
        let (fs, fake) = plugin("fs", json!([tool("list_dir")])).await;
        fake.set_reply(methods::TOOLS_CALL, FakeReply::Hang);
        registry.merge_plugin(&fs);

        let batch = ExecuteBatchUseCase::new(
            Arc::clone(&registry),
            Arc::new(AutoApprove),
            Arc::new(NoSessionObserver),
        )
        .with_settings(BatchSettings::default());
        let requests = vec![
            ToolCallRequest::new("c1", "sleep", json!({"secs": 5})),
            ToolCallRequest::new("c2", "list_dir", json!({})),
        ];
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let results = batch.execute(&registry.catalog(), &requests, &token).await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome.is_cancelled()));
        fake.wait_for_notification(methods::CANCELLED).await;
    }
}
