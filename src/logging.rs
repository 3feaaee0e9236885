//! Tracing subscriber setup for the `kbchat` binary.
//!
//! Logs go to stderr so stdout stays parseable (`kbchat ask --json`).
//! Verbosity comes from `RUST_LOG`, defaulting to `warn`.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
