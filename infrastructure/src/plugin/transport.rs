//! Transport abstraction and `Content-Length` framing.
//!
//! - [`PluginTransport`]: what a [`PluginClient`](super::client::PluginClient)
//!   needs from a connection. [`StdioTransport`](super::stdio::StdioTransport)
//!   is the real implementation; tests use an in-memory fake.
//! - [`write_frame`] / [`read_frame`]: the header-delimited framing shared
//!   by plugins and the model bridge.
//! - [`classify_message`]: decides how the reader task dispatches a frame.

use crate::plugin::error::{ConnectionError, Result};
use crate::plugin::protocol::{JsonRpcNotification, JsonRpcRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Largest frame body accepted from a peer
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// A bidirectional JSON-RPC connection to one plugin process.
#[async_trait]
pub trait PluginTransport: Send + Sync {
    /// Send a request and wait for its correlated result.
    ///
    /// A JSON-RPC error response becomes [`ConnectionError::Rpc`]. Dropping
    /// the returned future abandons the request.
    async fn request(&self, request: JsonRpcRequest) -> Result<Value>;

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Whether the peer is still connected
    fn is_alive(&self) -> bool;

    /// Ask the peer to exit, waiting at most `grace`, then force it.
    async fn shutdown(&self, grace: Duration);

    /// Incoming notifications. Yields the receiver once; later calls get `None`.
    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<JsonRpcNotification>>;
}

/// Classification of an incoming JSON-RPC message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response,
    /// A request from the peer (has `id` + `method`)
    IncomingRequest { id: u64 },
    /// A notification (has `method`, no `id`)
    Notification,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &Value) -> MessageKind {
    let has_id = json.get("id").and_then(|v| v.as_u64());
    let has_method = json.get("method").and_then(|v| v.as_str());

    match (has_id, has_method) {
        (Some(id), Some(_)) => MessageKind::IncomingRequest { id },
        (Some(_), None) => MessageKind::Response,
        _ => MessageKind::Notification,
    }
}

/// Turn a response's `result`/`error` pair into a `Result`.
pub fn into_result(response: crate::plugin::protocol::JsonRpcResponse) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(ConnectionError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Write one framed message and flush.
pub async fn write_frame<W>(writer: &mut W, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message body.
///
/// Returns `Ok(None)` on a clean end of stream before a header starts.
/// Unknown header lines (e.g. `Content-Type`) are skipped. A declared length
/// above [`MAX_FRAME_BYTES`] is rejected before anything is allocated.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = String::new();

    // Content-Length header, tolerating blank lines between frames
    let content_length = loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            break len_str.trim().parse::<usize>().map_err(|_| {
                ConnectionError::Malformed(format!("bad Content-Length header: {}", trimmed))
            })?;
        }
    };
    if content_length > MAX_FRAME_BYTES {
        return Err(ConnectionError::Malformed(format!(
            "frame of {} bytes exceeds the {} byte limit",
            content_length, MAX_FRAME_BYTES
        )));
    }

    // Remaining headers up to the blank separator
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ConnectionError::Closed);
        }
        if line.trim().is_empty() {
            break;
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
