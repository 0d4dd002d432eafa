//! A fake broker that replays a fixed response script.
//!
//! [`ScriptedBroker`] listens on a Unix socket in its own temp directory,
//! records every request it receives, and answers each connection with the
//! same pre-encoded lines.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sockbridge_core::shim::{ShimRequest, ShimResponse};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// What the broker does with a connection after writing its script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterScript {
    /// Close the connection.
    Close,
    /// Keep the connection open until the broker is dropped.
    HoldOpen,
}

/// A Unix socket broker that answers every connection with a fixed script.
///
/// The socket and temp directory are removed when this value is dropped.
pub struct ScriptedBroker {
    socket_path: PathBuf,
    requests: Arc<Mutex<Vec<ShimRequest>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl ScriptedBroker {
    /// Start a broker that replies with the given messages.
    pub fn with_responses(responses: &[ShimResponse], after: AfterScript) -> Self {
        let lines = responses
            .iter()
            .map(|r| r.encode_line().expect("response encodes"))
            .collect();
        Self::start(lines, after)
    }

    /// Start a broker that replies with raw bytes, one entry per write.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(script: Vec<Vec<u8>>, after: AfterScript) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("broker.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind broker socket");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let script = Arc::new(script);
        let task = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&script),
                        Arc::clone(&requests),
                        after,
                    ));
                }
            })
        };

        Self {
            socket_path,
            requests,
            connections,
            task,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the broker's Unix socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<ShimRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for ScriptedBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: UnixStream,
    script: Arc<Vec<Vec<u8>>>,
    requests: Arc<Mutex<Vec<ShimRequest>>>,
    after: AfterScript,
) {
    if let Some(request) = read_request(&mut stream).await {
        if let Ok(mut seen) = requests.lock() {
            seen.push(request);
        }
    }

    for chunk in script.iter() {
        if stream.write_all(chunk).await.is_err() {
            return;
        }
    }

    if after == AfterScript::HoldOpen {
        std::future::pending::<()>().await;
    }
}

/// Read until the buffered bytes form one complete JSON request.
async fn read_request(stream: &mut UnixStream) -> Option<ShimRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        match serde_json::from_slice::<ShimRequest>(&buf) {
            Ok(request) => return Some(request),
            Err(e) if e.is_eof() => continue,
            Err(_) => return None,
        }
    }
}
