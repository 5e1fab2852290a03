//! Test logging configuration utilities.
//!
//! Configures tracing for tests so output stays clean by default and can
//! be turned up with `RUST_LOG` when debugging.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

/// Initializes tracing for tests with the given default level.
///
/// Only the first call per process takes effect; later calls are ignored
/// because the global subscriber can be installed once.
pub fn init_test_logging(level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Suppresses all but error logs for clean test output.
pub fn quiet_test_logging() {
    init_test_logging("error");
}
