//! Development-time tracing for debugging the engine.
//!
//! Tracing is diagnostics only: `RUST_LOG` controls it and it goes to
//! stderr. Task reports and checkpoints (`io/results`, `io/checkpoint`)
//! are written regardless of the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=engine=debug eval run --dataset tasks.json --transcripts replies.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
