//! Tracing setup for the `authz` binary.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor `log.level` is set.
pub const DEFAULT_FILTER: &str = "info,authz=debug";

/// Picks the filter directive: `RUST_LOG`, then the configured level, then
/// [`DEFAULT_FILTER`].
pub fn filter_directive(rust_log: Option<&str>, configured: Option<&str>) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or(configured.filter(|s| !s.trim().is_empty()))
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable.
pub fn init(configured: Option<&str>) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| DEFAULT_FILTER.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
