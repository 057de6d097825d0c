//! Tracing subscriber setup.

use tracing::error;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// The `--log-level` flag seeds the default filter; a `RUST_LOG`
/// environment variable takes precedence when set. An unparseable level
/// falls back to `info` and is reported once logging is live.
pub fn init(level: &str) {
    let (filter, bad_level) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, None),
        Err(_) => match EnvFilter::try_new(level) {
            Ok(filter) => (filter, None),
            Err(err) => (EnvFilter::new("info"), Some(err)),
        },
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(err) = bad_level {
        error!(loglevel = level, error = %err, "Failed to set requested log level");
    }
}
