//! Tracing initialization for binaries and tests.
//!
//! Wraps [`tracing_subscriber`] with an env-filter so that verbosity is driven by
//! `RUST_LOG`, defaulting to `info` when the variable is unset or invalid.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Default filter applied when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVES: &str = "info";

static TEST_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber for a service binary.
///
/// Must be called once, early in `main`. Panics if a global subscriber was
/// already installed, which indicates a double initialization bug.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
        )
        .init();
}

/// Initializes tracing for tests.
///
/// Safe to call from every test; only the first call installs the subscriber.
/// Output is routed through the test writer so it interleaves with the
/// harness's captured output.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
            )
            .with_test_writer()
            .init();
    });
}
