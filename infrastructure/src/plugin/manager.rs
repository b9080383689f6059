//! Plugin lifecycle for a session.
//!
//! [`PluginManager`] connects every configured plugin concurrently, merges
//! the ready ones into the [`ToolRegistry`] and keeps the registry in step
//! with each client's [`PluginEvent`]s. It owns the strong references; the
//! registry only holds weak ones.

use crate::plugin::client::{PluginClient, PluginEvent};
use crate::tools::{MergeReport, ToolRegistry};
use conch_domain::{PluginId, PluginSpec, PluginStatus};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A plugin that could not be connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub id: PluginId,
    pub error: String,
}

pub struct PluginManager {
    registry: Arc<ToolRegistry>,
    clients: Mutex<Vec<Arc<PluginClient>>>,
    failures: Mutex<Vec<PluginFailure>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl PluginManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            clients: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Connect every spec concurrently.
    ///
    /// Connection failures are logged and recorded, never returned; the
    /// shell runs without the plugin.
    pub async fn connect_all(&self, specs: Vec<PluginSpec>) -> Vec<MergeReport> {
        let attempts = specs.into_iter().map(|spec| async move {
            let id = spec.id.clone();
            (id, PluginClient::connect(spec).await)
        });
        let outcomes = futures::future::join_all(attempts).await;

        let mut reports = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(client) => reports.push(self.add(client)),
                Err(e) => {
                    warn!(plugin = %id, "Plugin unavailable: {}", e);
                    self.failures
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(PluginFailure {
                            id,
                            error: e.to_string(),
                        });
                }
            }
        }
        reports
    }

    /// Take ownership of a connected client and merge its tools.
    pub fn add(&self, client: Arc<PluginClient>) -> MergeReport {
        let report = self.registry.merge_plugin(&client);
        if !report.is_clean() {
            warn!(plugin = %client.id(), "{}", report);
        }
        let watcher = Self::watch(Arc::clone(&self.registry), &client);
        self.watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(watcher);
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(client);
        report
    }

    /// Follow one client's events until it is dropped
    fn watch(registry: Arc<ToolRegistry>, client: &Arc<PluginClient>) -> JoinHandle<()> {
        let mut events = client.subscribe();
        let weak: Weak<PluginClient> = Arc::downgrade(client);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PluginEvent::ToolsChanged { id }) => {
                        if let Some(client) = weak.upgrade() {
                            let report = registry.merge_plugin(&client);
                            info!(plugin = %id, "Re-merged tools: {}", report);
                        }
                    }
                    Ok(PluginEvent::StatusChanged {
                        id,
                        status: PluginStatus::Degraded | PluginStatus::Closed,
                    }) => {
                        registry.remove_plugin(&id);
                    }
                    Ok(PluginEvent::StatusChanged { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Plugin events lagged, resynchronising");
                        if let Some(client) = weak.upgrade() {
                            if client.status().is_ready() {
                                registry.merge_plugin(&client);
                            } else {
                                registry.remove_plugin(client.id());
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn clients(&self) -> Vec<Arc<PluginClient>> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn failures(&self) -> Vec<PluginFailure> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// One line per configured plugin, for `/plugins`
    pub fn status_lines(&self) -> Vec<String> {
        let catalog = self.registry.catalog();
        let mut lines: Vec<String> = self
            .clients()
            .iter()
            .map(|client| {
                let merged = catalog
                    .iter()
                    .filter(|d| d.source.plugin_id() == Some(client.id()))
                    .count();
                let prompts = client.prompts().len();
                format!(
                    "{} [{}] {} tool(s), {} prompt(s)",
                    client.id(),
                    client.status(),
                    merged,
                    prompts
                )
            })
            .collect();
        lines.extend(
            self.failures()
                .into_iter()
                .map(|f| format!("{} [failed] {}", f.id, f.error)),
        );
        lines
    }

    /// Close every client and stop following their events.
    pub async fn shutdown_all(&self) {
        let clients = self.clients();
        futures::future::join_all(clients.iter().map(|c| c.close())).await;
        for watcher in self
            .watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            watcher.abort();
        }
        info!(plugins = clients.len(), "Plugins shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::protocol::methods;
    use crate::plugin::testing::{FakeReply, FakeTransport};
    use serde_json::json;
    use std::time::Duration;

    async fn fake_plugin(id: &str, tools: &[&str]) -> (Arc<PluginClient>, Arc<FakeTransport>) {
        let tools: Vec<_> = tools.iter().map(|n| json!({"name": n})).collect();
        let fake = Arc::new(FakeTransport::serving(json!(tools)));
        let client = PluginClient::connect_with(PluginSpec::new(id, "fake"), fake.clone())
            .await
            .unwrap();
        (client, fake)
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_add_merges_and_reports_status() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry));
        let (fs, _) = fake_plugin("fs", &["list_dir", "stat"]).await;

        let report = manager.add(fs);

        assert_eq!(report.accepted.len(), 2);
        assert_eq!(registry.catalog().len(), 2);
        assert_eq!(
            manager.status_lines(),
            vec!["fs [ready] 2 tool(s), 0 prompt(s)"]
        );
    }

    #[tokio::test]
    async fn test_tool_list_change_is_followed() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry));
        let (fs, fake) = fake_plugin("fs", &["list_dir"]).await;
        manager.add(fs);

        fake.set_reply(
            methods::TOOLS_LIST,
            FakeReply::Result(json!({"tools": [{"name": "tree"}, {"name": "stat"}]})),
        );
        fake.emit(methods::TOOLS_LIST_CHANGED);

        eventually(|| registry.catalog().names() == vec!["tree", "stat"]).await;
    }

    #[tokio::test]
    async fn test_dead_plugin_tools_are_removed() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry));
        let (fs, fake) = fake_plugin("fs", &["list_dir"]).await;
        manager.add(fs);

        fake.kill();

        eventually(|| registry.catalog().is_empty()).await;
        assert!(manager.status_lines()[0].contains("[degraded]"));
    }

    #[tokio::test]
    async fn test_connection_failures_are_not_fatal() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry));

        let reports = manager
            .connect_all(vec![PluginSpec::new("ghost", "/nonexistent/conch-plugin")])
            .await;

        assert!(reports.is_empty());
        assert_eq!(manager.failures()[0].id, PluginId::new("ghost"));
        assert!(manager.status_lines()[0].starts_with("ghost [failed]"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_client() {
        let registry = Arc::new(ToolRegistry::new());
        let manager = PluginManager::new(Arc::clone(&registry));
        let (fs, fs_fake) = fake_plugin("fs", &["list_dir"]).await;
        let (git, git_fake) = fake_plugin("git", &["git_log"]).await;
        manager.add(fs);
        manager.add(git);

        manager.shutdown_all().await;

        assert_eq!(fs_fake.shutdowns(), 1);
        assert_eq!(git_fake.shutdowns(), 1);
        assert!(manager
            .clients()
            .iter()
            .all(|c| c.status() == PluginStatus::Closed));
    }
}
