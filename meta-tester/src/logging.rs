//! Diagnostics for whoever reads the CI log.
//!
//! - **Tracing (this module)**: developer diagnostics on stderr, filtered by
//!   `RUST_LOG` or the `log_level` input.
//! - **Reporter (`io/reporter`)**: annotations and log groups on stdout. Always
//!   written, unaffected by the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used (Python-style names
/// such as `warning` or `critical` are accepted). Output: stderr, compact.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(normalize_level(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "" => "info".to_string(),
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}
