//! Diagnostic logging for the CLI.
//!
//! Output goes to stderr so edited wikitext on stdout stays clean. Filtering:
//! - `RUST_LOG=wikiedit_core=trace` wins when set
//! - otherwise `WIKIEDIT_LOG`, then `[editor] log_filter` from the config file
//! - otherwise `warn`

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. `fallback` is the already-resolved
/// `WIKIEDIT_LOG` / config / default filter.
pub fn init(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
}
