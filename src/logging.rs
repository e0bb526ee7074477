//! Structured logging for the provider.
//!
//! Events go to **stderr**; stdout belongs to whatever host drives the
//! provider. Filtering follows `RUST_LOG`.
//!
//! ```bash
//! # Plan and transition decisions
//! RUST_LOG=dbtcloud_provider=debug ./host
//!
//! # Only client traffic
//! RUST_LOG=warn,dbtcloud_provider::client=debug ./host
//! ```

use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

/// `RUST_LOG` if it parses, otherwise `default_level`.
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the global subscriber at `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Install the global subscriber, using `default_level` when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed. Suited to tests.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LEVEL).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // filter directives are exercised here.
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert!(EnvFilter::try_new("dbtcloud_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,dbtcloud_provider::client=trace").is_ok());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        try_init_logging();
        assert!(!try_init_logging());
    }
}
