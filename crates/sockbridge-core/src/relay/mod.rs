//! TCP → Unix domain socket relay.
//!
//! Clients that can only speak TCP connect to the relay; each accepted
//! connection is spliced onto a new connection to a Unix socket. The relay
//! has no protocol of its own, bytes are forwarded untouched.
//!
//! ```text
//! ┌──────────┐   TCP    ┌─────────────────┐   Unix socket   ┌──────────┐
//! │  client  │─────────▶│  RelayServer    │────────────────▶│  broker  │
//! │          │◀─────────│  2 pipes / pair │◀────────────────│          │
//! └──────────┘          └─────────────────┘                 └──────────┘
//! ```
//!
//! Failures stay local to one connection pair: a failed dial or a reset
//! peer tears down that pair only, the listener keeps accepting.

pub mod pipe;
pub mod provider;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream, UnixStream};
use tracing::{debug, error, info, warn};

use sockbridge_config::{ConfigError, PROXY_SOCK_ENV, RelayConfig};

use self::pipe::{Direction, PipeEnd, PipeOutcome, pipe};
pub use self::provider::{EnvSocketPath, SocketPathProvider, StaticSocketPath};

/// Listen backlog for the TCP socket; sized for bursts of local clients.
pub const LISTEN_BACKLOG: u32 = 128;

/// First pause after a failed accept (e.g. while out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound for the doubling accept backoff.
const MAX_ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Errors that stop the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("no Unix socket path configured (set {PROXY_SOCK_ENV})")]
    NotConfigured,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },

    #[error("listener is no longer usable: {0}")]
    Accept(#[source] io::Error),

    #[error("invalid relay configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A bound TCP listener that bridges every connection to a Unix socket.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    provider: Arc<dyn SocketPathProvider>,
}

impl RelayServer {
    /// Bind `addr` and prepare to bridge to whatever `provider` resolves.
    ///
    /// Fails when the provider has no path at all or the address cannot be
    /// bound. A path that does not exist yet only produces a warning; it is
    /// dialed lazily per connection. Must be called inside a tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        provider: Arc<dyn SocketPathProvider>,
    ) -> Result<Self, RelayError> {
        let target = provider.socket_path().ok_or(RelayError::NotConfigured)?;
        info!(path = %target.display(), "Target Unix socket");
        if !target.exists() {
            warn!(
                path = %target.display(),
                "Unix socket not found, it may appear later"
            );
        }

        let listener = bind_listener(addr).map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        info!(addr = %local_addr, "Relay listening");

        Ok(Self {
            listener,
            local_addr,
            provider,
        })
    }

    /// Bind using relay configuration, re-reading `PROXY_SOCK` per connection.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let addr = config.bind_addr()?;
        let provider = EnvSocketPath::proxy_sock(config.socket_path());
        Self::bind(addr, Arc::new(provider))
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and bridge connections until `shutdown` resolves.
    ///
    /// Per-connection failures never end the loop. Accept errors caused by
    /// resource exhaustion or an aborted handshake are retried with backoff
    /// for as long as they last; only errors that mean the listening socket
    /// itself is broken end the loop with [`RelayError::Accept`].
    pub async fn run<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut consecutive_errors = 0u32;
        let mut backoff = ACCEPT_ERROR_BACKOFF;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Relay shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if consecutive_errors > 0 {
                            info!(failures = consecutive_errors, "Accepting again");
                        }
                        consecutive_errors = 0;
                        backoff = ACCEPT_ERROR_BACKOFF;
                        let provider = Arc::clone(&self.provider);
                        tokio::spawn(handle_connection(stream, peer, provider));
                    }
                    Err(e) if is_fatal_accept_error(&e) => {
                        error!(error = %e, "Listener failed");
                        return Err(RelayError::Accept(e));
                    }
                    Err(e) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        if consecutive_errors == 1 || consecutive_errors.is_power_of_two() {
                            warn!(
                                error = %e,
                                count = consecutive_errors,
                                "Error in accept loop, retrying"
                            );
                        }
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_ACCEPT_ERROR_BACKOFF);
                    }
                }
            }
        }
    }
}

/// Whether an accept error means the listening socket itself is unusable.
///
/// Everything else (descriptor or memory exhaustion, handshakes aborted by
/// the peer, interrupted calls) clears up on its own.
pub fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EBADF | libc::EINVAL | libc::ENOTSOCK | libc::EOPNOTSUPP | libc::EFAULT)
    )
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Dial the current target and bridge `inbound` to it.
///
/// On dial failure the inbound connection is dropped, which closes it.
async fn handle_connection(
    inbound: TcpStream,
    peer: SocketAddr,
    provider: Arc<dyn SocketPathProvider>,
) {
    let Some(path) = provider.socket_path() else {
        warn!(%peer, "No Unix socket path configured, closing connection");
        return;
    };

    let outbound = match UnixStream::connect(&path).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                %peer,
                path = %path.display(),
                error = %e,
                "Failed to connect to Unix socket"
            );
            return;
        }
    };

    debug!(%peer, path = %path.display(), "Bridging connection");
    bridge(inbound, outbound, peer, path).await;
}

/// Run both directions of a pair and tear the pair down when either ends.
///
/// The directions never wait on each other. Once the first one finishes the
/// other is aborted, dropping its halves and closing both sockets.
async fn bridge(inbound: TcpStream, outbound: UnixStream, peer: SocketAddr, path: PathBuf) {
    let (tcp_read, tcp_write) = inbound.into_split();
    let (unix_read, unix_write) = outbound.into_split();

    let mut upstream = tokio::spawn(pipe(tcp_read, unix_write, Direction::Upstream));
    let mut downstream = tokio::spawn(pipe(unix_read, tcp_write, Direction::Downstream));

    let finished = tokio::select! {
        res = &mut upstream => {
            downstream.abort();
            res
        }
        res = &mut downstream => {
            upstream.abort();
            res
        }
    };

    match finished {
        Ok(outcome) => log_outcome(&outcome, peer, &path),
        Err(e) => warn!(%peer, error = %e, "Relay task failed"),
    }
}

fn log_outcome(outcome: &PipeOutcome, peer: SocketAddr, path: &Path) {
    match &outcome.end {
        PipeEnd::Eof => debug!(
            %peer,
            path = %path.display(),
            direction = %outcome.direction,
            bytes = outcome.bytes,
            "Connection closed"
        ),
        PipeEnd::Error(e) => warn!(
            %peer,
            path = %path.display(),
            direction = %outcome.direction,
            bytes = outcome.bytes,
            error = %e,
            "Connection failed"
        ),
    }
}
