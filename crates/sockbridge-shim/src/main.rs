#![deny(unsafe_code)]

//! sockbridge shim: installed (or symlinked) under a tool's name, e.g. `gh`.
//!
//! Arguments are never parsed here: everything after `argv[0]` belongs to the
//! tool and is forwarded verbatim.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use sockbridge_config::{BridgeConfig, CONFIG_PATH_ENV, SHIM_LOG_ENV};
use sockbridge_core::shim::{self, SHIM_FAILURE_EXIT_CODE};
use sockbridge_core::{Invocation, Shim};
use tracing::debug;

/// Exit code when the shim cannot even work out what to run.
const USAGE_EXIT_CODE: i32 = 2;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("[shim] failed to start runtime: {e}");
            return SHIM_FAILURE_EXIT_CODE;
        }
    };

    runtime.block_on(async {
        // Only the shim's own variable: a RUST_LOG meant for the caller must
        // not leak log lines into the tool's stderr.
        sockbridge_core::logging::init_from_var(SHIM_LOG_ENV, "warn");

        let argv: Vec<OsString> = std::env::args_os().collect();

        let config = match load_config().await {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[shim] {e:#}");
                return SHIM_FAILURE_EXIT_CODE;
            }
        };

        let invocation = match build_invocation(&config, argv) {
            Ok(invocation) => invocation,
            Err(e) => {
                eprintln!("[shim] {e:#}");
                return USAGE_EXIT_CODE;
            }
        };
        debug!(command = %invocation.command, args = ?invocation.args, "Shim invoked");

        Shim::from_config(&config.shim).invoke(&invocation).await
    })
}

/// Defaults, then the file named by `SOCKBRIDGE_CONFIG` (if set), then the
/// environment.
async fn load_config() -> Result<BridgeConfig> {
    let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            BridgeConfig::load(&path)
                .await
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        _ => BridgeConfig::default(),
    };
    config.apply_process_env();
    config.validate()?;
    Ok(config)
}

/// Turn the raw argument vector into an invocation rooted at the current
/// directory.
fn build_invocation(config: &BridgeConfig, argv: Vec<OsString>) -> Result<Invocation> {
    let mut argv = argv.into_iter();
    let argv0 = argv.next();
    let command = shim::resolve_command(&config.shim, argv0.as_deref()).ok_or_else(|| {
        anyhow!(
            "cannot tell which command to run; link this binary under the tool's name or set shim.command"
        )
    })?;
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    Ok(Invocation::new(command, argv, cwd))
}
