//! Tracing setup.
//!
//! Console-only structured logging, filtered through `RUST_LOG` with
//! an `info` default.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}
