//! One direction of a bridged connection pair.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of each read from the source side.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Which way bytes flow through a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// TCP client → Unix socket.
    Upstream,
    /// Unix socket → TCP client.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "tcp->unix"),
            Direction::Downstream => write!(f, "unix->tcp"),
        }
    }
}

/// Why a pipe stopped.
#[derive(Debug)]
pub enum PipeEnd {
    /// The source reported end-of-stream.
    Eof,
    /// Reading the source or writing the target failed.
    Error(io::Error),
}

/// Summary of a finished pipe.
#[derive(Debug)]
pub struct PipeOutcome {
    pub direction: Direction,
    pub bytes: u64,
    pub end: PipeEnd,
}

/// Copy `source` into `target` chunk by chunk until EOF or the first error.
///
/// The target's write side is shut down on the way out; failures there are
/// ignored since the peer may already be gone.
pub async fn pipe<R, W>(mut source: R, mut target: W, direction: Direction) -> PipeOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;

    let end = loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break PipeEnd::Eof,
            Ok(n) => n,
            Err(e) => break PipeEnd::Error(e),
        };
        if let Err(e) = target.write_all(&buf[..n]).await {
            break PipeEnd::Error(e);
        }
        bytes += n as u64;
    };

    let _ = target.shutdown().await;

    PipeOutcome {
        direction,
        bytes,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipe_copies_until_eof() {
        let payload: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let mut target = Vec::new();

        let outcome = pipe(&payload[..], &mut target, Direction::Upstream).await;

        assert_eq!(target, payload);
        assert_eq!(outcome.bytes, payload.len() as u64);
        assert!(matches!(outcome.end, PipeEnd::Eof));
        assert_eq!(outcome.direction, Direction::Upstream);
    }

    #[tokio::test]
    async fn test_pipe_stops_on_write_error() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);

        let outcome = pipe(&b"hello"[..], writer, Direction::Downstream).await;

        assert!(matches!(outcome.end, PipeEnd::Error(_)));
        assert_eq!(outcome.bytes, 0);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Upstream.to_string(), "tcp->unix");
        assert_eq!(Direction::Downstream.to_string(), "unix->tcp");
    }
}
