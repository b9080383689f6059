//! **Web tools**: `web_fetch`
//!
//! Gated behind the `web-tools` Cargo feature flag:
//!
//! ```toml
//! # infrastructure/Cargo.toml
//! [features]
//! web-tools = ["dep:reqwest", "dep:scraper"]
//!
//! # cli/Cargo.toml (enabled by default for end users)
//! [features]
//! default = ["web-tools"]
//! web-tools = ["conch-infrastructure/web-tools"]
//! ```

mod fetch;

pub use fetch::{WEB_FETCH, WebFetchTool, html_to_text};
