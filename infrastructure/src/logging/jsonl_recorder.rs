//! JSONL file writer for conversation history.
//!
//! Each [`ConversationEvent`] becomes one JSON line: the payload's fields
//! plus `type` and `timestamp`. Lines are appended, so a session file can be
//! tailed while the shell runs.

use conch_application::{ConversationEvent, ConversationRecorder};
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Appends one JSON object per event to a file.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes after every line and on `Drop`.
pub struct JsonlConversationRecorder {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlConversationRecorder {
    /// Open `path` for appending, creating it and its parent directories.
    ///
    /// Returns `None` (after logging why) if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create conversation log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open conversation log {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// `<dir>/conversation-<session_id>.jsonl`
    pub fn create(dir: impl AsRef<Path>, session_id: &str) -> Option<Self> {
        Self::new(dir.as_ref().join(format!("conversation-{}.jsonl", session_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn to_line(event: ConversationEvent) -> serde_json::Result<String> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut record = Map::new();
        record.insert("type".into(), Value::String(event.event_type.to_string()));
        record.insert("timestamp".into(), Value::String(timestamp));
        match event.payload {
            Value::Object(fields) => {
                for (key, value) in fields {
                    record.entry(key).or_insert(value);
                }
            }
            other => {
                record.insert("data".into(), other);
            }
        }
        serde_json::to_string(&Value::Object(record))
    }
}

impl ConversationRecorder for JsonlConversationRecorder {
    fn record(&self, event: ConversationEvent) {
        let event_type = event.event_type;
        let line = match Self::to_line(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(event = event_type, "Could not serialize conversation event: {}", e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(path = %self.path.display(), "Conversation log write failed: {}", e);
        }
    }
}

impl Drop for JsonlConversationRecorder {
    fn drop(&mut self) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writer.flush();
    }
}
