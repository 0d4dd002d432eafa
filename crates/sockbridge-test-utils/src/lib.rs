#![deny(unsafe_code)]

//! Shared test utilities for the sockbridge workspace.
//!
//! Provides config builders, tracing helpers, a scripted fake broker and a
//! disposable relay so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! sockbridge-test-utils = { workspace = true }
//! ```
//!
//! Fixtures that exchange `sockbridge-core` types are meant for integration
//! tests (`tests/`); unit tests inside `sockbridge-core` see a separate copy
//! of that crate's types.

pub mod broker;
pub mod config;
pub mod relay;
pub mod runner;
pub mod tracing_setup;

pub use broker::{AfterScript, ScriptedBroker};
pub use config::TestConfigBuilder;
pub use relay::TestRelay;
pub use runner::RecordingRunner;
