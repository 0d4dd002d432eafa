//! One bridged invocation: connect, send the request, replay the response.
//!
//! ```text
//! CONNECTING ──▶ SENDING_REQUEST ──▶ STREAMING ──▶ EXITED(code)
//!      │               │                 │    └──▶ ERRORED
//!      └───────────────┴─────────────────┴──▶ transport failure
//! ```
//!
//! Transport failures are reported as [`SessionError`]s; the caller decides
//! whether they permit falling back to local execution via
//! [`SessionError::allows_fallback`].

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use super::SHIM_FAILURE_EXIT_CODE;
use super::protocol::{ShimRequest, ShimResponse};

/// How a bridged invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The broker reported the command's exit code.
    Exited(i32),
    /// The broker declined or failed to run the command.
    Errored(String),
}

impl Outcome {
    /// The exit code the shim process should finish with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Exited(code) => *code,
            Outcome::Errored(_) => SHIM_FAILURE_EXIT_CODE,
        }
    }
}

/// Errors from a bridged invocation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect to bridge socket at {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error("failed to send request: {0}")]
    Send(#[source] io::Error),

    #[error("bridge connection failed before any response: {0}")]
    Receive(#[source] io::Error),

    #[error("bridge closed the connection without responding")]
    NoResponse,

    #[error("bridge connection lost after {messages} message(s) without an exit status")]
    Interrupted {
        messages: usize,
        #[source]
        source: Option<io::Error>,
    },

    #[error("malformed response from bridge: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("failed to write command output: {0}")]
    Output(#[source] io::Error),
}

impl SessionError {
    /// Whether the broker never produced any observable effect, so running
    /// the command locally instead cannot duplicate output.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            SessionError::Connect { .. }
                | SessionError::Send(_)
                | SessionError::Receive(_)
                | SessionError::NoResponse
        )
    }
}

/// An open connection to the broker.
pub struct Session {
    stream: UnixStream,
}

impl Session {
    /// Open a connection to the broker socket.
    pub async fn connect(path: &Path) -> Result<Self, SessionError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| SessionError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "Connected to bridge");
        Ok(Self { stream })
    }

    /// Write the request as a single JSON document.
    pub async fn send(&mut self, request: &ShimRequest) -> Result<(), SessionError> {
        let body = request.to_bytes()?;
        self.stream
            .write_all(&body)
            .await
            .map_err(SessionError::Send)?;
        debug!(command = %request.command, args = request.args.len(), "Request sent");
        Ok(())
    }

    /// Replay the response stream onto the given output streams.
    pub async fn stream<O, E>(self, stdout: &mut O, stderr: &mut E) -> Result<Outcome, SessionError>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        drive(self.stream, stdout, stderr).await
    }
}

/// Read newline-delimited responses from `reader` until a terminal message.
///
/// Output chunks are written and flushed one message at a time, so the
/// interleaving of stdout and stderr matches the wire order. Nothing after
/// the terminal message is read. A final line without a trailing newline is
/// still decoded when the stream ends.
pub async fn drive<R, O, E>(reader: R, stdout: &mut O, stderr: &mut E) -> Result<Outcome, SessionError>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut messages = 0usize;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await;
        let n = match read {
            Ok(n) => n,
            Err(e) if messages == 0 => return Err(SessionError::Receive(e)),
            Err(e) => {
                return Err(SessionError::Interrupted {
                    messages,
                    source: Some(e),
                });
            }
        };
        if n == 0 {
            return Err(if messages == 0 {
                SessionError::NoResponse
            } else {
                SessionError::Interrupted {
                    messages,
                    source: None,
                }
            });
        }

        let Some(message) = ShimResponse::decode_line(&line)? else {
            continue;
        };
        messages += 1;

        match message {
            ShimResponse::Stdout { data } => {
                trace!(bytes = data.len(), "stdout chunk");
                forward(stdout, &data).await?;
            }
            ShimResponse::Stderr { data } => {
                trace!(bytes = data.len(), "stderr chunk");
                forward(stderr, &data).await?;
            }
            ShimResponse::Exit { code } => {
                debug!(code, "Bridge reported exit");
                return Ok(Outcome::Exited(code));
            }
            ShimResponse::Error { message } => {
                debug!(%message, "Bridge reported error");
                return Ok(Outcome::Errored(message));
            }
        }
    }
}

async fn forward<W: AsyncWrite + Unpin>(out: &mut W, data: &[u8]) -> Result<(), SessionError> {
    out.write_all(data).await.map_err(SessionError::Output)?;
    out.flush().await.map_err(SessionError::Output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;

    fn line(msg: ShimResponse) -> Vec<u8> {
        msg.encode_line().unwrap()
    }

    fn stdout(data: &[u8]) -> ShimResponse {
        ShimResponse::Stdout {
            data: data.to_vec(),
        }
    }

    fn stderr(data: &[u8]) -> ShimResponse {
        ShimResponse::Stderr {
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_streams_in_wire_order() {
        let mut wire = Vec::new();
        wire.extend(line(stdout(b"A")));
        wire.extend(line(stderr(b"B")));
        wire.extend(line(stdout(b"C")));
        wire.extend(line(ShimResponse::Exit { code: 0 }));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = drive(&wire[..], &mut out, &mut err).await.unwrap();

        assert_eq!(outcome, Outcome::Exited(0));
        assert_eq!(out, b"AC");
        assert_eq!(err, b"B");
    }

    #[tokio::test]
    async fn test_ignores_everything_after_exit() {
        let mut wire = Vec::new();
        wire.extend(line(stdout(b"before")));
        wire.extend(line(ShimResponse::Exit { code: 7 }));
        wire.extend(line(stdout(b"after")));
        wire.extend(b"garbage that would not parse\n");

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = drive(&wire[..], &mut out, &mut err).await.unwrap();

        assert_eq!(outcome, Outcome::Exited(7));
        assert_eq!(out, b"before");
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_error_message_is_terminal() {
        let wire = line(ShimResponse::Error {
            message: "x".to_string(),
        });

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = drive(&wire[..], &mut out, &mut err).await.unwrap();

        assert_eq!(outcome, Outcome::Errored("x".to_string()));
        assert_eq!(outcome.exit_code(), SHIM_FAILURE_EXIT_CODE);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_reassembles_partial_reads() {
        let (mut broker, client) = tokio::io::duplex(16);
        let mut wire = Vec::new();
        wire.extend(line(stdout(b"hello, world")));
        wire.extend(b"\n\n");
        wire.extend(line(ShimResponse::Exit { code: 2 }));

        let writer = tokio::spawn(async move {
            for chunk in wire.chunks(5) {
                broker.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            // Keep the connection open; the exit message must end the drive.
            broker
        });

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = drive(client, &mut out, &mut err).await.unwrap();

        assert_eq!(outcome, Outcome::Exited(2));
        assert_eq!(out, b"hello, world");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let wire = br#"{"type":"error","message":"Command rm not allowed"}"#;

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = drive(&wire[..], &mut out, &mut err).await.unwrap();

        assert_eq!(outcome, Outcome::Errored("Command rm not allowed".to_string()));
    }

    #[tokio::test]
    async fn test_empty_stream_allows_fallback() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result = drive(&b""[..], &mut out, &mut err).await;

        let e = result.unwrap_err();
        assert!(matches!(e, SessionError::NoResponse));
        assert!(e.allows_fallback());
    }

    #[tokio::test]
    async fn test_blank_lines_only_allows_fallback() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result = drive(&b"\n\n"[..], &mut out, &mut err).await;
        assert!(matches!(result, Err(SessionError::NoResponse)));
    }

    #[tokio::test]
    async fn test_disconnect_after_output_is_hard_error() {
        let mut wire = Vec::new();
        wire.extend(line(stdout(b"partial")));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let e = drive(&wire[..], &mut out, &mut err).await.unwrap_err();

        assert!(matches!(e, SessionError::Interrupted { messages: 1, .. }));
        assert!(!e.allows_fallback());
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn test_malformed_line_is_protocol_error() {
        let mut wire = Vec::new();
        wire.extend(line(stdout(b"ok")));
        wire.extend(b"{\"type\":\"progress\"}\n");
        wire.extend(line(ShimResponse::Exit { code: 0 }));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let e = drive(&wire[..], &mut out, &mut err).await.unwrap_err();

        assert!(matches!(e, SessionError::Protocol(_)));
        assert!(!e.allows_fallback());
        assert_eq!(out, b"ok");
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let result = Session::connect(&dir.path().join("absent.sock")).await;

        let e = result.err().unwrap();
        assert!(matches!(e, SessionError::Connect { .. }));
        assert!(e.allows_fallback());
    }
}
