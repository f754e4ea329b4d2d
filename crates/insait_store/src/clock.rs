//! Time source used for history and session timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Time provider trait for testing.
///
/// Lets tests drive `watched_at` ordering and trimming deterministically.
/// Only used when explicitly set via
/// [`SessionManager::with_time_provider`](crate::SessionManager::with_time_provider).
pub trait TimeProvider: Send + Sync {
    /// Returns the current Unix timestamp in milliseconds.
    fn now_millis(&self) -> i64;
}

impl<F> TimeProvider for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn now_millis(&self) -> i64 {
        self()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
