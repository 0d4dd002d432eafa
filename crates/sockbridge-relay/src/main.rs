#![deny(unsafe_code)]

//! sockbridge relay: exposes a Unix domain socket on a loopback TCP port.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sockbridge_config::BridgeConfig;
use sockbridge_core::RelayServer;
use sockbridge_core::build_info;
use tracing::info;

/// Forward every TCP connection on a loopback port to the Unix socket named
/// by `PROXY_SOCK`.
#[derive(Parser, Debug)]
#[command(name = "sockbridge-relay", version = build_info::VERSION_STRING, about, long_about = None)]
struct Cli {
    /// TCP port to listen on (overrides the config file).
    port: Option<u16>,

    /// Path to configuration file.
    #[arg(short, long, default_value = "sockbridge.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate and print the resolved configuration, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = resolve_config(&cli.config, cli.port).await?;
    sockbridge_core::logging::init(&config.logging.level, cli.verbose);

    if cli.check {
        let toml_str =
            toml::to_string_pretty(&config).context("failed to render configuration")?;
        println!("{toml_str}");
        return Ok(());
    }

    info!(version = build_info::VERSION_STRING, "Starting sockbridge relay");

    let server = RelayServer::from_config(&config.relay)
        .context("failed to start relay")?;
    server.run(shutdown_signal()).await?;

    info!("Relay stopped");
    Ok(())
}

/// File (if present), then environment, then the command line.
async fn resolve_config(path: &Path, port: Option<u16>) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::load_or_default(path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.apply_process_env();
    if let Some(port) = port {
        config.relay.listen_port = port;
    }
    config.validate()?;
    Ok(config)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
