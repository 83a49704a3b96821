//! Subscriber setup for binaries and test harnesses embedding the crate.

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "inputcore=debug";

/// Installs a `fmt` subscriber filtered by `INPUTCORE_LOG`, then `RUST_LOG`.
///
/// Does nothing if a global subscriber is already set.
pub fn init() {
    let directives = std::env::var("INPUTCORE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);

    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .try_init();
}
