//! Logging setup for the CLI.
//!
//! Library crates only emit tracing events; the binary installs the
//! subscriber. `RUST_LOG` overrides the flag-derived filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Call once, before any logging.
pub fn init(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new(crate_filter("debug"))
    } else if quiet {
        EnvFilter::new(crate_filter("error"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(crate_filter("info")))
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Directive string covering every workspace crate at one level.
fn crate_filter(level: &str) -> String {
    const CRATES: &[&str] = &[
        "ionify_core",
        "ionify_config",
        "ionify_graph",
        "ionify_resolver",
        "ionify_store",
        "ionify_transform",
        "ionify_bundler",
        "ionify_dev",
        "ionify_cli",
    ];
    CRATES
        .iter()
        .map(|c| format!("{}={}", c, level))
        .collect::<Vec<_>>()
        .join(",")
}
