//! Logging setup.
//!
//! Thin wrapper over `tracing-subscriber`. Hosts that install their own
//! subscriber can skip this entirely; `init` is safe to call more than once.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a subscriber honoring `RUST_LOG`, defaulting to `info`.
pub fn init() {
    init_with_filter("info");
}

/// Install a subscriber with explicit default directives.
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives));
    // Ignore the error if a subscriber is already installed.
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Install a JSON-formatted subscriber, for hosts that ship structured logs.
pub fn init_json(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
