//! Logging setup.
//!
//! The crate logs through `tracing` everywhere; binaries (and tests that
//! want output) call [`init`] once to install a subscriber honoring
//! `RUST_LOG`.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber. Subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pressroom_client=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
