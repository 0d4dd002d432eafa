//! A relay running on an ephemeral loopback port for the duration of a test.

use std::net::SocketAddr;
use std::sync::Arc;

use sockbridge_core::relay::{RelayError, RelayServer, SocketPathProvider};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A [`RelayServer`] bound to `127.0.0.1:0` and running in the background.
pub struct TestRelay {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), RelayError>>,
}

impl TestRelay {
    /// Bind and start accepting. Must be called from within a tokio runtime.
    pub fn start(provider: Arc<dyn SocketPathProvider>) -> Self {
        let bind: SocketAddr = "127.0.0.1:0".parse().expect("valid loopback address");
        let server = RelayServer::bind(bind, provider).expect("failed to bind test relay");
        let addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// The relay's TCP address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the accept loop is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal shutdown and wait for the accept loop to return.
    pub async fn stop(mut self) -> Result<(), RelayError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await.expect("relay task panicked")
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
