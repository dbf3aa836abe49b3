//! Result and error types for mapgrab.

use thiserror::Error;

/// Result type for mapgrab operations
pub type MapGrabResult<T> = Result<T, MapGrabError>;

/// Errors that can occur in mapgrab
#[derive(Debug, Error)]
pub enum MapGrabError {
    /// Locator resolved to zero usable matches after filtering and indexing
    #[error("Element does not exist: {locator}")]
    ElementNotExist {
        /// Locator description with breadcrumbs
        locator: String,
    },

    /// Locator resolved to several matches and no index narrows it down
    #[error("Too many elements: {locator} resolved to {count} matches")]
    TooManyElements {
        /// Locator description with breadcrumbs
        locator: String,
        /// Number of matches found
        count: usize,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Page error
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Script evaluation against the page failed
    #[error("Script evaluation failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Native pointer input failed
    #[error("Input simulation failed: {message}")]
    Input {
        /// Error message
        message: String,
    },

    /// Screenshot capture failed
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// An externally bounded wait elapsed
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Map assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MapGrabError {
    /// Whether this is one of the locator cardinality errors
    #[must_use]
    pub const fn is_cardinality(&self) -> bool {
        matches!(
            self,
            Self::ElementNotExist { .. } | Self::TooManyElements { .. }
        )
    }
}
