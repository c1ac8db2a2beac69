//! Diagnostic logging.
//!
//! Progress and warnings go to stderr through `tracing`; the run summary and
//! reports are product output and never pass through here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "stubsmith=info";

/// Installs the global subscriber. `RUST_LOG` overrides `DEFAULT_FILTER`.
///
/// ```bash
/// RUST_LOG=stubsmith=debug stubsmith --library src/pkg --tests tests
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
        .try_init();
}
