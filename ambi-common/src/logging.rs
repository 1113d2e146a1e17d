//! Tracing subscriber setup shared by all binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the default filter directive for a set of crate targets.
///
/// `default_filter(&["ambi_agent", "ambi_common"], "debug")` yields
/// `ambi_agent=debug,ambi_common=debug`.
pub fn default_filter(targets: &[&str], level: &str) -> String {
    targets
        .iter()
        .map(|t| format!("{}={}", t, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize tracing: `RUST_LOG` wins, otherwise `fallback` is used.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
