use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for structured logging.
///
/// `default_filter` applies when `RUST_LOG` is unset (binaries pass "info",
/// or something noisier under a verbose flag). Debug builds get
/// human-readable output; release builds emit JSON for log aggregation.
/// Calling this twice is a no-op rather than a panic, so tests and embedding
/// applications can both call it freely.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = if cfg!(debug_assertions) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    };

    // A second init means a subscriber is already installed; keep it.
    let _ = result;
}
