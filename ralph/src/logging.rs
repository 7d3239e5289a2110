//! Diagnostic tracing for the loop.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, and never mixed into command output on stdout.
//!
//! - **Iteration logging (`io/iteration_log`)**: product artifacts in
//!   `.ralph/iterations/`. Controlled by `loop.log_iterations`, unaffected by
//!   `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
///
/// ```bash
/// RUST_LOG=ralph=debug ralph run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
