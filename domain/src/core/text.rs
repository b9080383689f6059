//! String helpers used when rendering tool arguments and outputs.

/// Truncate a string to at most `max_len` bytes, appending `...` (UTF-8 safe).
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3).min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Collapse a multi-line string into its first line, truncated.
pub fn first_line(s: &str, max_len: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.len() < s.trim_end().len() {
        format!("{} …", truncate(line, max_len))
    } else {
        truncate(line, max_len)
    }
}
