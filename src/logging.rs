//! Logging setup for the provider process.
//!
//! All logs go to **stderr**; the host owns stdout.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: full filter directives (e.g. `cxcloud_integrations=debug`)
//! - `TF_LOG`: a bare level name, used when `RUST_LOG` is unset
//!
//! ```bash
//! # Retry attempts and handler detail
//! RUST_LOG=cxcloud_integrations=debug ./provider
//!
//! # Same thing, the way hosts usually set it
//! TF_LOG=DEBUG ./provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Host-level log variable, read when `RUST_LOG` is unset.
pub const HOST_LOG_ENV: &str = "TF_LOG";

/// Pick the filter from `RUST_LOG`, then `host_level`, then `default_level`.
fn resolve_filter(rust_log: Option<&str>, host_level: Option<&str>, default_level: &str) -> EnvFilter {
    if let Some(filter) = rust_log.and_then(|d| EnvFilter::try_new(d).ok()) {
        return filter;
    }
    host_level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .and_then(|level| EnvFilter::try_new(level.to_ascii_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

fn build_filter(default_level: &str) -> EnvFilter {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let host_level = std::env::var(HOST_LOG_ENV).ok();
    resolve_filter(rust_log.as_deref(), host_level.as_deref(), default_level)
}

fn subscriber(
    default_level: &str,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(build_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize logging at `info` unless the environment says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with `default_level` as the fallback filter.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if a subscriber is already set.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}
