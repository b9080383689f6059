//! In-memory plugin transport for tests.

use crate::plugin::error::{ConnectionError, Result};
use crate::plugin::protocol::{JsonRpcNotification, JsonRpcRequest, PROTOCOL_VERSION, methods};
use crate::plugin::transport::PluginTransport;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub(crate) enum FakeReply {
    Result(Value),
    Error(i64, &'static str),
    /// Never answers
    Hang,
}

/// Scripted replies per method.
///
/// Each method has a queue; the last reply in a queue repeats forever.
/// Unscripted methods answer `-32601`.
pub(crate) struct FakeTransport {
    replies: Mutex<HashMap<String, VecDeque<FakeReply>>>,
    requests: Mutex<Vec<(String, Option<Value>)>>,
    notified: Mutex<Vec<(String, Option<Value>)>>,
    alive: AtomicBool,
    shutdowns: AtomicUsize,
    notification_tx: Mutex<Option<mpsc::UnboundedSender<JsonRpcNotification>>>,
    notification_rx: Mutex<Option<mpsc::UnboundedReceiver<JsonRpcNotification>>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            notified: Mutex::new(Vec::new()),
            alive: AtomicBool::new(true),
            shutdowns: AtomicUsize::new(0),
            notification_tx: Mutex::new(Some(tx)),
            notification_rx: Mutex::new(Some(rx)),
        }
    }

    /// A plugin that completes the handshake and offers `tools`
    pub(crate) fn serving(tools: Value) -> Self {
        Self::new()
            .with_reply(methods::INITIALIZE, FakeReply::Result(initialize_result(PROTOCOL_VERSION)))
            .with_reply(methods::TOOLS_LIST, FakeReply::Result(json!({"tools": tools})))
            .with_reply(methods::PROMPTS_LIST, FakeReply::Result(json!({"prompts": []})))
    }

    pub(crate) fn with_reply(self, method: &str, reply: FakeReply) -> Self {
        self.push_reply(method, reply);
        self
    }

    /// Replace the script for `method`
    pub(crate) fn set_reply(&self, method: &str, reply: FakeReply) {
        let mut replies = self.replies.lock().unwrap();
        replies.insert(method.to_string(), VecDeque::from([reply]));
    }

    pub(crate) fn push_reply(&self, method: &str, reply: FakeReply) {
        let mut replies = self.replies.lock().unwrap();
        replies.entry(method.to_string()).or_default().push_back(reply);
    }

    /// Deliver a notification as if the plugin had sent it
    pub(crate) fn emit(&self, method: &str) {
        if let Some(tx) = self.notification_tx.lock().unwrap().as_ref() {
            let _ = tx.send(JsonRpcNotification {
                method: method.to_string(),
                params: None,
            });
        }
    }

    /// Simulate the process dying
    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.notification_tx.lock().unwrap().take();
    }

    pub(crate) fn requests(&self, method: &str) -> Vec<Option<Value>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub(crate) fn notified(&self, method: &str) -> Vec<Option<Value>> {
        self.notified
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Wait until a notification named `method` has been sent
    pub(crate) async fn wait_for_notification(&self, method: &str) -> Option<Value> {
        for _ in 0..100 {
            if let Some(params) = self.notified(method).into_iter().next() {
                return params;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notification {} never sent", method);
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn next_reply(&self, method: &str) -> Option<FakeReply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(method)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

pub(crate) fn initialize_result(version: &str) -> Value {
    json!({
        "protocolVersion": version,
        "capabilities": {"tools": {"listChanged": true}},
        "serverInfo": {"name": "fake", "version": "0.0.1"}
    })
}

#[async_trait]
impl PluginTransport for FakeTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((request.method.clone(), request.params.clone()));
        if !self.is_alive() {
            return Err(ConnectionError::Closed);
        }
        match self.next_reply(&request.method) {
            Some(FakeReply::Result(value)) => Ok(value),
            Some(FakeReply::Error(code, message)) => Err(ConnectionError::Rpc {
                code,
                message: message.to_string(),
            }),
            Some(FakeReply::Hang) => std::future::pending().await,
            None => Err(ConnectionError::Rpc {
                code: -32601,
                message: format!("Method not found: {}", request.method),
            }),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_alive() {
            return Err(ConnectionError::Closed);
        }
        self.notified
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self, _grace: Duration) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.kill();
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        self.notification_rx.lock().unwrap().take()
    }
}
