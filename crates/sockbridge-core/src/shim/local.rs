//! Running the real tool on this machine.

use std::ffi::OsString;
use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

use super::{Invocation, ShimError};
use crate::BoxFuture;

/// Exit code reported when the local tool cannot be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Executes an invocation locally and reports its exit code.
pub trait LocalRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<i32, ShimError>>;
}

/// Spawns the tool through an optional runner prefix (e.g. `pkgx`), with
/// stdio inherited, and waits for it.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    prefix: Vec<String>,
}

impl CommandRunner {
    /// `prefix` is placed before the command name; empty runs it directly.
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    /// The program and argument vector that will be executed.
    pub fn command_line(&self, invocation: &Invocation) -> (OsString, Vec<OsString>) {
        let mut parts = self
            .prefix
            .iter()
            .chain(std::iter::once(&invocation.command))
            .map(OsString::from)
            .chain(invocation.args.iter().cloned());
        // The chain always yields at least the command name.
        let program = parts.next().unwrap_or_default();
        (program, parts.collect())
    }
}

impl LocalRunner for CommandRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<i32, ShimError>> {
        Box::pin(async move {
            let (program, args) = self.command_line(invocation);
            debug!(?program, ?args, cwd = %invocation.cwd.display(), "Running locally");

            let mut child = Command::new(&program)
                .args(&args)
                .current_dir(&invocation.cwd)
                .spawn()
                .map_err(|source| ShimError::Spawn {
                    program: program.to_string_lossy().into_owned(),
                    source,
                })?;

            let status = child
                .wait()
                .await
                .map_err(|source| ShimError::Wait {
                    program: program.to_string_lossy().into_owned(),
                    source,
                })?;
            Ok(exit_code(status))
        })
    }
}

/// Map a finished process to a shell-style exit code.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
