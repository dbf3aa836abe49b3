//! Bounding for the indefinite waits.
//!
//! Readiness, stability and empty-result polling never time out by
//! themselves. Wrap them in [`bounded`] (or `tokio::time::timeout`) when a
//! test needs a deadline.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::result::{MapGrabError, MapGrabResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Interval between empty-result feature queries (100ms)
pub const DEFAULT_QUERY_POLL_INTERVAL_MS: u64 = 100;

/// Default timeout for map assertions (5 seconds)
pub const DEFAULT_ASSERTION_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval for map assertions (300ms)
pub const DEFAULT_ASSERTION_POLL_INTERVAL_MS: u64 = 300;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Timeout and polling cadence for bounded polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ASSERTION_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_ASSERTION_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Run `fut` with a deadline, failing with [`MapGrabError::Timeout`].
///
/// Errors produced by `fut` itself pass through unchanged.
pub async fn bounded<F, T>(limit: Duration, fut: F) -> MapGrabResult<T>
where
    F: Future<Output = MapGrabResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            let ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            debug!(ms, "bounded wait elapsed");
            Err(MapGrabError::Timeout { ms })
        }
    }
}
