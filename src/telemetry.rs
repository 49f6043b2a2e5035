//! Diagnostic tracing.
//!
//! Revealed agent log entries are product output and go to stdout; this module only
//! covers developer diagnostics, written to stderr and filtered by `RUST_LOG`
//! (default `warn`).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
