//! Tracing subscriber setup.
//!
//! Every binary logs through `tracing` to stderr; each line carries a
//! timestamp. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::EnvFilter;

/// Resolve the effective filter directive from a base level and a `-v` count.
///
/// Each `-v` raises the level by one step, saturating at `trace`.
pub fn level_for(base: &str, verbose: u8) -> &str {
    const LADDER: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

    let Some(start) = LADDER.iter().position(|l| *l == base) else {
        return base;
    };
    let idx = (start + verbose as usize).min(LADDER.len() - 1);
    LADDER[idx]
}

/// Build the filter used by [`init`].
pub fn env_filter(base: &str, verbose: u8) -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok(), base, verbose)
}

/// A filter from an explicit directive string, falling back to `base`
/// (raised by `verbose`) when it is absent or does not parse.
pub fn filter_from(directive: Option<String>, base: &str, verbose: u8) -> EnvFilter {
    directive
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level_for(base, verbose)))
}

/// Install the global subscriber writing timestamped lines to stderr.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(base: &str, verbose: u8) {
    install(env_filter(base, verbose));
}

/// Like [`init`], but the override comes from `var` instead of `RUST_LOG`.
pub fn init_from_var(var: &str, base: &str) {
    install(filter_from(std::env::var(var).ok(), base, 0));
}

fn install(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
