//! Command shim: a drop-in stand-in for a command-line tool.
//!
//! The shim forwards an invocation to a broker listening on a Unix socket
//! and replays the broker's output and exit code, so the caller cannot tell
//! whether the tool ran here or behind the socket. Invocations that carry a
//! local-only flag, or that find no broker, run the real tool locally.
//!
//! ```text
//!        local-only flag / non-UTF-8 argument / no socket
//! INIT ───────────────────────────────────────────────▶ LOCAL_EXEC
//!   │                                                      ▲
//!   └─▶ CONNECTING ─▶ SENDING_REQUEST ─▶ STREAMING ────────┤ transport failure,
//!                                          │               │ nothing received yet
//!                                          ├─▶ EXITED(code)
//!                                          └─▶ ERRORED
//! ```

pub mod local;
pub mod protocol;
pub mod session;

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use sockbridge_config::ShimConfig;

pub use self::local::{CommandRunner, LocalRunner, SPAWN_FAILURE_EXIT_CODE};
pub use self::protocol::{ShimRequest, ShimResponse};
pub use self::session::{Outcome, Session, SessionError};

/// Exit code for broker `error` messages and shim-detected protocol failures.
pub const SHIM_FAILURE_EXIT_CODE: i32 = 1;

/// Name of the shim binary itself; never treated as a command to forward.
pub const SHIM_BINARY_NAME: &str = "sockbridge-shim";

/// Errors from the shim outside of the bridged session itself.
#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    #[error("failed to launch {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("failed waiting for {program}: {source}")]
    Wait { program: String, source: io::Error },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A command invocation as the shim received it.
///
/// Arguments are kept as raw OS strings so a local run sees exactly the
/// bytes the caller passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new<I, A>(command: impl Into<String>, args: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
        }
    }

    /// Whether every argument is valid UTF-8, i.e. survives the JSON request
    /// unchanged.
    pub fn has_utf8_args(&self) -> bool {
        self.args.iter().all(|arg| arg.to_str().is_some())
    }

    /// The wire request for this invocation.
    pub fn to_request(&self) -> ShimRequest {
        ShimRequest {
            command: self.command.clone(),
            args: self
                .args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            cwd: self.cwd.to_string_lossy().into_owned(),
        }
    }
}

/// Pick the command name: explicit configuration first, otherwise the file
/// name the shim was invoked as (`argv[0]`), so one binary can be linked
/// under several tool names.
pub fn resolve_command(config: &ShimConfig, argv0: Option<&OsStr>) -> Option<String> {
    if let Some(command) = &config.command {
        return Some(command.clone());
    }
    let name = Path::new(argv0?).file_name()?.to_str()?;
    (name != SHIM_BINARY_NAME && !name.is_empty()).then(|| name.to_string())
}

/// Decides bridge-vs-local for each invocation and carries it out.
pub struct Shim {
    socket_path: Option<PathBuf>,
    local_only_flags: Vec<String>,
    runner: Box<dyn LocalRunner>,
}

impl Shim {
    pub fn new(
        socket_path: Option<PathBuf>,
        local_only_flags: Vec<String>,
        runner: Box<dyn LocalRunner>,
    ) -> Self {
        Self {
            socket_path,
            local_only_flags,
            runner,
        }
    }

    /// Build a shim from configuration with a [`CommandRunner`].
    pub fn from_config(config: &ShimConfig) -> Self {
        Self::new(
            config.socket_path(),
            config.local_only_flags.clone(),
            Box::new(CommandRunner::new(config.local_runner.clone())),
        )
    }

    /// Whether any argument forces local execution.
    pub fn is_local_only(&self, args: &[OsString]) -> bool {
        args.iter().any(|arg| {
            self.local_only_flags
                .iter()
                .any(|flag| arg.as_os_str() == OsStr::new(flag))
        })
    }

    /// The broker socket, if one is configured and currently present.
    pub fn bridge_target(&self) -> Option<&Path> {
        self.socket_path.as_deref().filter(|p| p.exists())
    }

    /// Run an invocation with the process's own stdout and stderr.
    pub async fn invoke(&self, invocation: &Invocation) -> i32 {
        let mut stdout = tokio::io::stdout();
        let mut stderr = tokio::io::stderr();
        self.invoke_with(invocation, &mut stdout, &mut stderr).await
    }

    /// Run an invocation, writing bridged output and diagnostics to the
    /// given streams. Returns the exit code the shim should finish with.
    pub async fn invoke_with<O, E>(&self, invocation: &Invocation, stdout: &mut O, stderr: &mut E) -> i32
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        if self.is_local_only(&invocation.args) {
            debug!(command = %invocation.command, "Local-only flag present");
            return self.run_local(invocation, stderr).await;
        }

        if !invocation.has_utf8_args() {
            debug!(command = %invocation.command, "Non-UTF-8 argument, running locally");
            return self.run_local(invocation, stderr).await;
        }

        let Some(path) = self.bridge_target() else {
            debug!(socket = ?self.socket_path, "No bridge socket available");
            return self.run_local(invocation, stderr).await;
        };

        match bridge(path, invocation, stdout, stderr).await {
            Ok(outcome) => {
                if let Outcome::Errored(message) = &outcome {
                    diagnostic(stderr, &format!("[shim error] {message}")).await;
                }
                outcome.exit_code()
            }
            Err(e) if e.allows_fallback() => {
                diagnostic(stderr, &format!("[shim] bridge unavailable, running locally: {e}")).await;
                self.run_local(invocation, stderr).await
            }
            Err(e) => {
                diagnostic(stderr, &format!("[shim] {e}")).await;
                SHIM_FAILURE_EXIT_CODE
            }
        }
    }

    async fn run_local<E: AsyncWrite + Unpin>(&self, invocation: &Invocation, stderr: &mut E) -> i32 {
        match self.runner.run(invocation).await {
            Ok(code) => code,
            Err(e) => {
                diagnostic(stderr, &format!("[shim] {e}")).await;
                SPAWN_FAILURE_EXIT_CODE
            }
        }
    }
}

async fn bridge<O, E>(
    path: &Path,
    invocation: &Invocation,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<Outcome, SessionError>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut session = Session::connect(path).await?;
    session.send(&invocation.to_request()).await?;
    session.stream(stdout, stderr).await
}

async fn diagnostic<E: AsyncWrite + Unpin>(stderr: &mut E, message: &str) {
    let line = format!("{message}\n");
    let _ = stderr.write_all(line.as_bytes()).await;
    let _ = stderr.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeRunner {
        code: i32,
        calls: Arc<Mutex<Vec<Invocation>>>,
    }

    impl LocalRunner for FakeRunner {
        fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<i32, ShimError>> {
            self.calls.lock().unwrap().push(invocation.clone());
            let code = self.code;
            Box::pin(async move { Ok(code) })
        }
    }

    struct FailingRunner;

    impl LocalRunner for FailingRunner {
        fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<i32, ShimError>> {
            let program = invocation.command.clone();
            Box::pin(async move {
                Err(ShimError::Spawn {
                    program,
                    source: io::Error::from(io::ErrorKind::NotFound),
                })
            })
        }
    }

    fn gh(args: &[&str]) -> Invocation {
        Invocation::new("gh", args.iter().copied(), "/work")
    }

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn flags() -> Vec<String> {
        ShimConfig::default().local_only_flags
    }

    #[test]
    fn test_local_only_detection() {
        let shim = Shim::new(None, flags(), Box::new(FakeRunner::default()));
        assert!(shim.is_local_only(&os_args(&["pr", "--help"])));
        assert!(shim.is_local_only(&os_args(&["-v"])));
        assert!(!shim.is_local_only(&os_args(&["pr", "list"])));
        assert!(!shim.is_local_only(&os_args(&["--helpful"])));
    }

    #[test]
    fn test_request_from_invocation() {
        let req = gh(&["pr", "view", "12"]).to_request();
        assert_eq!(req.command, "gh");
        assert_eq!(req.args, vec!["pr", "view", "12"]);
        assert_eq!(req.cwd, "/work");
    }

    #[test]
    fn test_resolve_command_prefers_config() {
        let config = ShimConfig {
            command: Some("git".to_string()),
            ..ShimConfig::default()
        };
        assert_eq!(
            resolve_command(&config, Some(OsStr::new("/usr/local/bin/gh"))),
            Some("git".to_string())
        );
    }

    #[test]
    fn test_resolve_command_from_argv0() {
        let config = ShimConfig::default();
        assert_eq!(
            resolve_command(&config, Some(OsStr::new("/sandbox/bin/gh"))),
            Some("gh".to_string())
        );
        assert_eq!(
            resolve_command(&config, Some(OsStr::new("opencode"))),
            Some("opencode".to_string())
        );
    }

    #[test]
    fn test_resolve_command_rejects_shim_itself() {
        let config = ShimConfig::default();
        assert_eq!(
            resolve_command(&config, Some(OsStr::new("/usr/bin/sockbridge-shim"))),
            None
        );
        assert_eq!(resolve_command(&config, None), None);
    }

    #[tokio::test]
    async fn test_no_socket_runs_locally() {
        let runner = FakeRunner {
            code: 5,
            ..FakeRunner::default()
        };
        let calls = Arc::clone(&runner.calls);
        let shim = Shim::new(None, flags(), Box::new(runner));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = shim.invoke_with(&gh(&["pr", "list"]), &mut out, &mut err).await;

        assert_eq!(code, 5);
        assert_eq!(calls.lock().unwrap().as_slice(), &[gh(&["pr", "list"])]);
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_missing_socket_file_runs_locally() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default();
        let calls = Arc::clone(&runner.calls);
        let shim = Shim::new(Some(dir.path().join("gone.sock")), flags(), Box::new(runner));

        assert!(shim.bridge_target().is_none());
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = shim.invoke_with(&gh(&["status"]), &mut out, &mut err).await;

        assert_eq!(code, 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_argument_is_lossy_only_on_the_wire() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(b"a\xffb".to_vec());
        let inv = Invocation::new("gh", [OsString::from("view"), raw.clone()], "/work");

        assert!(!inv.has_utf8_args());
        assert_eq!(inv.args[1], raw);
        assert_eq!(inv.to_request().args, vec!["view", "a\u{fffd}b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_argument_runs_locally_with_raw_bytes() {
        use std::os::unix::ffi::OsStringExt;

        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bridge.sock");
        std::fs::write(&socket, b"").unwrap();

        let runner = FakeRunner::default();
        let calls = Arc::clone(&runner.calls);
        let shim = Shim::new(Some(socket), flags(), Box::new(runner));
        assert!(shim.bridge_target().is_some());

        let raw = OsString::from_vec(b"a\xffb".to_vec());
        let inv = Invocation::new("gh", [raw.clone()], "/work");
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = shim.invoke_with(&inv, &mut out, &mut err).await;

        assert_eq!(code, 0);
        assert!(err.is_empty());
        assert_eq!(calls.lock().unwrap()[0].args, vec![raw]);
    }

    #[tokio::test]
    async fn test_spawn_failure_exit_code() {
        let shim = Shim::new(None, flags(), Box::new(FailingRunner));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = shim.invoke_with(&gh(&["status"]), &mut out, &mut err).await;

        assert_eq!(code, SPAWN_FAILURE_EXIT_CODE);
        assert!(String::from_utf8_lossy(&err).starts_with("[shim] failed to launch gh"));
    }
}
