//! Tracing subscriber setup for test binaries.
//!
//! mapgrab logs resolution, merging, pointer gestures and layer mutations at
//! `debug`, and every empty-result poll at `trace`. Nothing is printed until a
//! subscriber is installed; these helpers install one.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "mapgrab=info";

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Install a subscriber honoring `RUST_LOG`, defaulting to [`DEFAULT_FILTER`].
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter, LogFormat::Pretty)
}

/// Install a subscriber with an explicit filter directive such as
/// `"mapgrab=debug"`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing_with_filter(directives: &str, format: LogFormat) -> bool {
    install(EnvFilter::new(directives), format)
}

fn install(filter: EnvFilter, format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_test_writer())
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_test_writer())
            .try_init(),
    };
    installed.is_ok()
}
