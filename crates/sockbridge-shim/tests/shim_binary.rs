//! Runs the built `sockbridge-shim` binary with no broker, so every call
//! goes to the local tool.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use sockbridge_config::{BRIDGE_SOCK_ENV, CONFIG_PATH_ENV, SHIM_LOG_ENV};
use sockbridge_test_utils::TestConfigBuilder;
use tempfile::TempDir;

/// Writes a config that runs `sh` directly, with no runner prefix.
fn sh_config(dir: &Path) -> PathBuf {
    let config = TestConfigBuilder::new().command("sh").local_runner(&[]).build();
    let path = dir.join("shim.toml");
    std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();
    path
}

fn shim(config: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sockbridge-shim"));
    cmd.env(CONFIG_PATH_ENV, config)
        .env_remove(BRIDGE_SOCK_ENV)
        .env_remove(SHIM_LOG_ENV)
        .env_remove("RUST_LOG");
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run sockbridge-shim")
}

#[cfg(unix)]
#[test]
fn test_local_tool_receives_raw_argument_bytes() {
    use std::os::unix::ffi::OsStringExt;

    let dir = TempDir::new().unwrap();
    let config = sh_config(dir.path());
    let sink = dir.path().join("arg.bin");

    let output = run(shim(&config)
        .arg("-c")
        .arg(r#"printf %s "$1" > "$2""#)
        .arg("sh")
        .arg(std::ffi::OsString::from_vec(b"a\xffb".to_vec()))
        .arg(&sink));

    assert!(output.status.success(), "{output:?}");
    assert_eq!(std::fs::read(&sink).unwrap(), b"a\xffb".to_vec());
}

#[test]
fn test_exit_code_of_local_tool_is_propagated() {
    let dir = TempDir::new().unwrap();
    let config = sh_config(dir.path());

    let output = run(shim(&config).args(["-c", "exit 3"]));

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_callers_rust_log_does_not_reach_stderr() {
    let dir = TempDir::new().unwrap();
    let config = sh_config(dir.path());

    let output = run(shim(&config).env("RUST_LOG", "trace").args(["-c", "true"]));

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stderr), "");
}

#[test]
fn test_shim_log_variable_enables_logging() {
    let dir = TempDir::new().unwrap();
    let config = sh_config(dir.path());

    let output = run(shim(&config).env(SHIM_LOG_ENV, "debug").args(["-c", "true"]));

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Shim invoked"));
}
