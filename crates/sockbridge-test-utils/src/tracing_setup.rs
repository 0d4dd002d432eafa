//! Log capture for relay and shim tests.
//!
//! Relay failures (dial errors, torn-down pairs) are only visible as log
//! lines; [`init_test_tracing`] routes them into libtest's captured output
//! so a failing test shows what the relay saw.

use tracing_subscriber::EnvFilter;

/// Route `debug` and above to the test writer, or whatever `RUST_LOG` asks
/// for. Later calls in the same test binary do nothing.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .with_target(false)
        .try_init();
}
