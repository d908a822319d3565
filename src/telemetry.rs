//! Tracing subscriber setup.
//!
//! JSON lines by default, filtered by `RUST_LOG` (falling back to `info`).
//! Set `LOG_FORMAT=pretty` for human-readable output during development.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let pretty = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("pretty"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = if pretty {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
}
