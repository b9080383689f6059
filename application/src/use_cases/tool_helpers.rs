//! Shared helpers for tool use cases.

use conch_domain::ToolCallRequest;

/// Extract a short preview string from tool call arguments.
///
/// Looks for well-known keys (`path`, `command`, `pattern`, `query`, `url`)
/// first, then falls back to the first string value found.
pub fn args_preview(request: &ToolCallRequest) -> String {
    let Some(arguments) = request.arguments.as_object() else {
        return String::new();
    };
    let keys = ["path", "command", "pattern", "query", "url"];
    for key in &keys {
        if let Some(serde_json::Value::String(s)) = arguments.get(*key) {
            return truncate_preview(s, 50);
        }
    }
    // Fallback: first string value
    for value in arguments.values() {
        if let Some(s) = value.as_str() {
            return truncate_preview(s, 50);
        }
    }
    String::new()
}

fn truncate_preview(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max_len && first_line.len() == s.len() {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}
