//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`BridgeConfig`] values
//! without repeating boilerplate across crate boundaries.

use sockbridge_config::BridgeConfig;

/// Fluent builder for [`BridgeConfig`] in tests.
///
/// Starts from the defaults with the relay on an ephemeral loopback port.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .command("sh")
///     .local_runner(&[])
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: BridgeConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = BridgeConfig::default();
        config.relay.listen_port = 0;
        Self { config }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.config.shim.command = Some(command.to_string());
        self
    }

    pub fn local_runner(mut self, runner: &[&str]) -> Self {
        self.config.shim.local_runner = runner.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
