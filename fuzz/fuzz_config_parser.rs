//! Fuzz target for `sockbridge.toml` parsing.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! `BridgeConfig::parse` runs on operator-supplied files before either binary
//! starts. Any input must end in a config or a `ConfigError`, never a panic
//! (listen address checks, per-entry flag and runner validation included).

#![no_main]

use libfuzzer_sys::fuzz_target;
use sockbridge_config::BridgeConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = BridgeConfig::parse(text) {
        assert!(config.relay.bind_addr().is_ok());
    }
});
