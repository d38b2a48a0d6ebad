//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`; an unparsable filter falls back to
/// `info`. Calling this twice is harmless (the second call is ignored).
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
