//! Shared utilities for use cases.

use std::time::Instant;

/// Milliseconds elapsed since `start`, saturating at `u64::MAX`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
