//! Child-process transport speaking framed JSON-RPC over stdio.
//!
//! A single background reader task owns the child's stdout and routes each
//! frame: responses complete the matching pending request, notifications go
//! to the client's channel, and requests from the plugin are refused with
//! `-32601`. Writes are serialized through a shared writer that the reader
//! task also uses for those refusals.

use crate::plugin::error::{ConnectionError, Result};
use crate::plugin::protocol::{
    JsonRpcNotification, JsonRpcNotificationOut, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponseOut, methods,
};
use crate::plugin::transport::{
    MessageKind, PluginTransport, classify_message, into_result, read_frame, write_frame,
};
use async_trait::async_trait;
use conch_domain::PluginSpec;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl From<&PluginSpec> for ProcessCommand {
    fn from(spec: &PluginSpec) -> Self {
        Self {
            program: spec.command.clone(),
            args: spec.args.clone(),
            env: spec.env.clone(),
            cwd: spec.cwd.clone(),
        }
    }
}

/// Removes a pending entry when the request future goes away early
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&self.id);
    }
}

/// Marks the transport dead and fails pending requests when the reader
/// task ends, including by panic or abort.
struct ReaderExit {
    pending: PendingMap,
    alive: Arc<AtomicBool>,
}

impl Drop for ReaderExit {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.clear();
    }
}

pub struct StdioTransport {
    label: String,
    reader_handle: JoinHandle<()>,
    pending: PendingMap,
    writer: SharedWriter,
    alive: Arc<AtomicBool>,
    notifications: std::sync::Mutex<Option<mpsc::UnboundedReceiver<JsonRpcNotification>>>,
    /// Killed on Drop to prevent orphans
    child: std::sync::Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn `command` and attach to its stdio.
    ///
    /// Stderr lines are re-emitted at `debug` with the plugin label.
    pub fn spawn(label: impl Into<String>, command: &ProcessCommand) -> Result<Self> {
        let label = label.into();
        debug!(plugin = %label, program = %command.program, args = ?command.args, "Spawning process");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        // Linux: request kernel to send SIGTERM to child when parent dies.
        // This catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| ConnectionError::Spawn {
            command: command.program.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("Failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("Failed to capture stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(plugin = %label, "{}", line);
                }
            });
        }

        let transport = Self::from_streams(label, stdout, stdin);
        *transport.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
        Ok(transport)
    }

    /// Build a transport over already-connected streams.
    pub fn from_streams<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = label.into();
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let alive = Arc::new(AtomicBool::new(true));
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();

        let reader_handle = tokio::spawn(Self::reader_loop(
            label.clone(),
            BufReader::new(Box::new(reader) as Box<dyn AsyncRead + Send + Unpin>),
            Arc::clone(&pending),
            Arc::clone(&writer),
            notification_tx,
            Arc::clone(&alive),
        ));

        Self {
            label,
            reader_handle,
            pending,
            writer,
            alive,
            notifications: std::sync::Mutex::new(Some(notification_rx)),
            child: std::sync::Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Background reader loop, single owner of the read half.
    ///
    /// When it exits the transport is marked dead and every pending sender
    /// is dropped, so waiting requests observe [`ConnectionError::Closed`].
    async fn reader_loop(
        label: String,
        mut reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
        pending: PendingMap,
        writer: SharedWriter,
        notifications: mpsc::UnboundedSender<JsonRpcNotification>,
        alive: Arc<AtomicBool>,
    ) {
        let _exit = ReaderExit {
            pending: Arc::clone(&pending),
            alive,
        };

        loop {
            let body = match read_frame(&mut reader).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    info!(plugin = %label, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(plugin = %label, "Reader loop: {}", e);
                    break;
                }
            };
            trace!(plugin = %label, "Received: {}", String::from_utf8_lossy(&body));

            let json: Value = match serde_json::from_slice(&body) {
                Ok(v) => v,
                Err(e) => {
                    warn!(plugin = %label, "Failed to parse JSON: {}", e);
                    continue;
                }
            };

            match classify_message(&json) {
                MessageKind::Response => {
                    let response: JsonRpcResponse = match serde_json::from_value(json) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(plugin = %label, "Failed to parse response: {}", e);
                            continue;
                        }
                    };
                    let Some(id) = response.id else { continue };
                    let sender = {
                        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                        pending.remove(&id)
                    };
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => debug!(plugin = %label, id, "No pending receiver for response"),
                    }
                }
                MessageKind::IncomingRequest { id } => {
                    let method = json.get("method").and_then(|m| m.as_str()).unwrap_or("");
                    debug!(plugin = %label, id, method, "Refusing incoming request");
                    let response = JsonRpcResponseOut::method_not_found(id, method);
                    if let Ok(body) = serde_json::to_string(&response) {
                        let mut w = writer.lock().await;
                        let _ = write_frame(&mut *w, &body).await;
                    }
                }
                MessageKind::Notification => match serde_json::from_value(json) {
                    Ok(notification) => {
                        let _ = notifications.send(notification);
                    }
                    Err(e) => warn!(plugin = %label, "Failed to parse notification: {}", e),
                },
            }
        }
    }

    async fn send(&self, body: &str) -> Result<()> {
        trace!(plugin = %self.label, "Sending: {}", body);
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, body).await
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl PluginTransport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<Value> {
        if !self.is_alive() {
            return Err(ConnectionError::Closed);
        }

        let (tx, rx) = oneshot::channel();
        let id = request.id;
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(id, tx);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let body = serde_json::to_string(&request)?;
        self.send(&body).await?;

        let response = rx.await.map_err(|_| ConnectionError::Closed)?;
        into_result(response)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_alive() {
            return Err(ConnectionError::Closed);
        }
        let body = serde_json::to_string(&JsonRpcNotificationOut::new(method, params))?;
        self.send(&body).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;

        if self.is_alive() {
            let request = JsonRpcRequest::new(methods::SHUTDOWN, None);
            match tokio::time::timeout_at(deadline, self.request(request)).await {
                Ok(Ok(_)) => debug!(plugin = %self.label, "Shutdown acknowledged"),
                Ok(Err(e)) => debug!(plugin = %self.label, "Shutdown request failed: {}", e),
                Err(_) => debug!(plugin = %self.label, "Shutdown request timed out"),
            }
        }

        // Closing stdin is the conventional exit signal for stdio servers
        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }

        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => debug!(plugin = %self.label, %status, "Process exited"),
                _ => {
                    warn!(plugin = %self.label, "Process did not exit within grace, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        self.reader_handle.abort();
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader_handle.abort();
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = child.as_mut() {
            debug!(plugin = %self.label, "Transport dropping, killing child process");
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{DuplexStream, duplex};

    struct Peer {
        reader: BufReader<DuplexStream>,
        writer: DuplexStream,
    }

    impl Peer {
        async fn next(&mut self) -> Value {
            let body = read_frame(&mut self.reader).await.unwrap().unwrap();
            serde_json::from_slice(&body).unwrap()
        }

        async fn send(&mut self, value: Value) {
            write_frame(&mut self.writer, &value.to_string()).await.unwrap();
        }
    }

    fn connected() -> (StdioTransport, Peer) {
        let (client_write, server_read) = duplex(4096);
        let (server_write, client_read) = duplex(4096);
        let transport = StdioTransport::from_streams("test", client_read, client_write);
        let peer = Peer {
            reader: BufReader::new(server_read),
            writer: server_write,
        };
        (transport, peer)
    }

    #[tokio::test]
    async fn test_responses_are_correlated_out_of_order() {
        let (transport, mut peer) = connected();
        let transport = Arc::new(transport);

        let t1 = Arc::clone(&transport);
        let first = tokio::spawn(async move {
            t1.request(JsonRpcRequest::new("first", None)).await
        });
        let a = peer.next().await;
        let t2 = Arc::clone(&transport);
        let second = tokio::spawn(async move {
            t2.request(JsonRpcRequest::new("second", None)).await
        });
        let b = peer.next().await;

        peer.send(json!({"jsonrpc": "2.0", "id": b["id"], "result": "B"})).await;
        peer.send(json!({"jsonrpc": "2.0", "id": a["id"], "result": "A"})).await;

        assert_eq!(first.await.unwrap().unwrap(), json!("A"));
        assert_eq!(second.await.unwrap().unwrap(), json!("B"));
        assert_eq!(transport.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_incoming_requests_are_refused() {
        let (_transport, mut peer) = connected();

        peer.send(json!({"jsonrpc": "2.0", "id": 99, "method": "roots/list"})).await;

        let reply = peer.next().await;
        assert_eq!(reply["id"], 99);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_notifications_are_forwarded_once() {
        let (transport, mut peer) = connected();
        let mut rx = transport.take_notifications().unwrap();
        assert!(transport.take_notifications().is_none());

        peer.send(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}))
            .await;

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.method, "notifications/tools/list_changed");
    }

    #[tokio::test]
    async fn test_peer_close_fails_pending_requests() {
        let (transport, mut peer) = connected();
        let transport = Arc::new(transport);
        let t = Arc::clone(&transport);
        let call = tokio::spawn(async move {
            t.request(JsonRpcRequest::new("tools/call", None)).await
        });
        let _ = peer.next().await;

        drop(peer);

        assert!(matches!(call.await.unwrap(), Err(ConnectionError::Closed)));
        assert!(!transport.is_alive());
        assert!(matches!(
            transport.request(JsonRpcRequest::new("tools/list", None)).await,
            Err(ConnectionError::Closed)
        ));
    }

    async fn assert_bad_frame_fails_pending_request(raw: &[u8]) {
        let (transport, mut peer) = connected();
        let transport = Arc::new(transport);
        let t = Arc::clone(&transport);
        let call = tokio::spawn(async move {
            t.request(JsonRpcRequest::new("tools/call", None)).await
        });
        let _ = peer.next().await;

        peer.writer.write_all(raw).await.unwrap();
        peer.writer.flush().await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), call)
            .await
            .expect("pending request must resolve after a bad frame")
            .unwrap();
        assert!(matches!(outcome, Err(ConnectionError::Closed)));
        assert!(!transport.is_alive());
        assert_eq!(transport.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_fails_pending_requests() {
        assert_bad_frame_fails_pending_request(b"Content-Length: 18446744073709551615\r\n\r\n")
            .await;
    }

    #[tokio::test]
    async fn test_malformed_header_fails_pending_requests() {
        assert_bad_frame_fails_pending_request(b"Content-Length: many\r\n\r\n{}").await;
    }

    #[tokio::test]
    async fn test_abandoned_request_leaves_no_pending_entry() {
        let (transport, mut peer) = connected();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            transport.request(JsonRpcRequest::new("tools/call", None)),
        )
        .await;
        assert!(abandoned.is_err());
        let _ = peer.next().await;

        assert_eq!(transport.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_notify_writes_without_id() {
        let (transport, mut peer) = connected();

        transport
            .notify(methods::CANCELLED, Some(json!({"requestId": 3})))
            .await
            .unwrap();

        let message = peer.next().await;
        assert_eq!(message["method"], methods::CANCELLED);
        assert!(message.get("id").is_none());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = StdioTransport::spawn(
            "ghost",
            &ProcessCommand::new("/nonexistent/conch-plugin-binary"),
        );
        assert!(matches!(result, Err(ConnectionError::Spawn { .. })));
    }
}
