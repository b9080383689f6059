//! web_fetch tool: Fetch a URL and extract text content

use crate::tools::builtin::{BuiltinTool, cancellable, truncate_in_place};
use async_trait::async_trait;
use conch_domain::{
    ParamType, ParameterSpec, PayloadMetadata, ToolDescriptor, ToolOutcome, ToolPayload,
    ValidatedArguments,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tool name constant
pub const WEB_FETCH: &str = "web_fetch";

/// Maximum response body size (5 MB)
const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// Default max output text size (50 KB)
const DEFAULT_MAX_TEXT: usize = 50 * 1024;

const USER_AGENT: &str = concat!("conch/", env!("CARGO_PKG_VERSION"), " (agent tool)");

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn fetch(&self, url: &str, max_length: usize) -> ToolOutcome {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutcome::execution_error(format!("Failed to fetch URL: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolOutcome::execution_error(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));
        }

        let content_length = response.content_length().unwrap_or(0);
        if content_length > MAX_BODY_SIZE as u64 {
            return ToolOutcome::execution_error(format!(
                "Response too large: {} bytes (max: {} bytes)",
                content_length, MAX_BODY_SIZE
            ));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.bytes().await {
            Ok(b) if b.len() > MAX_BODY_SIZE => {
                return ToolOutcome::execution_error(format!(
                    "Response too large: {} bytes",
                    b.len()
                ));
            }
            Ok(b) => b,
            Err(e) => {
                return ToolOutcome::execution_error(format!(
                    "Failed to read response body: {}",
                    e
                ));
            }
        };

        let body_str = String::from_utf8_lossy(&body);
        let mut text =
            if content_type.contains("text/html") || content_type.contains("application/xhtml") {
                html_to_text(&body_str)
            } else {
                body_str.into_owned()
            };
        let total = text.len();
        let truncated = truncate_in_place(&mut text, max_length);
        if truncated {
            text.push_str(&format!(
                "\n\n[... truncated at {} bytes, total: {} bytes]",
                max_length, total
            ));
        }

        ToolOutcome::Success(
            ToolPayload::text(format!(
                "## Fetched: {}\n\nStatus: {} | Content-Type: {} | Size: {} bytes{}\n\n{}",
                url,
                status.as_u16(),
                content_type,
                total,
                if truncated { " (truncated)" } else { "" },
                text,
            ))
            .with_metadata(PayloadMetadata {
                bytes: Some(body.len()),
                truncated,
                ..Default::default()
            }),
        )
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuiltinTool for WebFetchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builtin(
            WEB_FETCH,
            "Fetch a web page and extract its text content. Returns the readable text from the page.",
        )
        .with_parameter(ParameterSpec::required("url", "The URL to fetch", ParamType::String))
        .with_parameter(ParameterSpec::optional(
            "max_length",
            "Maximum length of extracted text in bytes (default: 51200)",
            ParamType::Integer,
        ))
    }

    async fn execute(
        &self,
        arguments: ValidatedArguments,
        cancellation: CancellationToken,
    ) -> ToolOutcome {
        let url = match arguments.require_str("url") {
            Ok(u) => u,
            Err(e) => return ToolOutcome::execution_error(e),
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return ToolOutcome::execution_error(format!(
                "Unsupported URL '{}': only http and https are allowed",
                url
            ));
        }
        let max_length = arguments
            .get_u64("max_length")
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_TEXT);

        cancellable(&cancellation, self.fetch(url, max_length)).await
    }
}

/// Extract readable text from HTML, stripping tags, scripts, and styles
pub fn html_to_text(html: &str) -> String {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);

    // Tags whose entire subtree should be ignored
    let skip_tags = ["script", "style", "noscript", "svg"];

    // Try to use <body>, fall back to the whole document
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());

    let parts = match body {
        Some(body) => collect_element_text(body, &skip_tags),
        None => collect_element_text(document.root_element(), &skip_tags),
    };

    clean_whitespace(&parts.join(" "))
}

/// Recursively collect text from an element, skipping elements matching skip_tags
fn collect_element_text(element: scraper::ElementRef, skip_tags: &[&str]) -> Vec<String> {
    if skip_tags.contains(&element.value().name()) {
        return Vec::new();
    }

    let mut parts = Vec::new();
    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = scraper::ElementRef::wrap(child) {
                    parts.extend(collect_element_text(child_el, skip_tags));
                }
            }
            _ => {}
        }
    }
    parts
}

/// Clean up excessive whitespace
fn clean_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_whitespace = false;
    let mut newline_count = 0;

    for ch in text.chars() {
        if ch == '\n' {
            newline_count += 1;
            if newline_count <= 2 {
                result.push('\n');
            }
            prev_was_whitespace = true;
        } else if ch.is_whitespace() {
            if !prev_was_whitespace {
                result.push(' ');
            }
            prev_was_whitespace = true;
            newline_count = 0;
        } else {
            result.push(ch);
            prev_was_whitespace = false;
            newline_count = 0;
        }
    }

    result.trim().to_string()
}
