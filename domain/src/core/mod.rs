//! Core domain concepts shared across all subdomains.
//!
//! - [`error::DomainError`]: registration and naming errors
//! - [`validation::ConfigIssue`]: non-fatal configuration findings
//! - [`text`]: UTF-8 safe string helpers for previews

pub mod error;
pub mod text;
pub mod validation;
