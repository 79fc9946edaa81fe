use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

const DEFAULT_FILTER: &str = "info";

// Returns the filter named by RUST_LOG, or `default` when it is unset or invalid
fn filter_or(default: &str) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default),
    }
}

/// Installs the global subscriber for a node binary. Safe to call more than
/// once; only the first call has an effect.
pub fn init() {
    let _ = registry()
        .with(fmt::layer().with_target(false))
        .with(filter_or(DEFAULT_FILTER))
        .try_init();
}
