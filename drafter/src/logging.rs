//! Diagnostic tracing for the drafter.
//!
//! - **Tracing (this module)**: `RUST_LOG`-controlled diagnostics on stderr.
//! - **Event log (`io/checkpoint`)**: `.drafter/runs/<id>/events.jsonl`, written
//!   for every run through the file store regardless of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=drafter=debug drafter run src/
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
