//! Mock compositor for tests
//!
//! Binds a Unix socket in a temp dir and answers every request frame with
//! whatever the handler returns. Each accepted connection is served on its
//! own task until the client hangs up.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use crate::codec;
use crate::transport::Transport;

/// Wrap a JSON-producing handler so the reply echoes the request type
pub(crate) fn reply_with<F>(f: F) -> impl Fn(u32, &str) -> (u32, Vec<u8>) + Send + Sync + 'static
where
    F: Fn(u32, &str) -> Value + Send + Sync + 'static,
{
    move |kind: u32, payload: &str| {
        let reply = f(kind, payload);
        (kind, serde_json::to_vec(&reply).expect("reply serializes"))
    }
}

pub(crate) struct MockSway {
    _dir: TempDir,
    path: PathBuf,
    requests: Arc<Mutex<Vec<(u32, String)>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockSway {
    /// Serve requests, answering each with `handler(type, payload)`
    pub(crate) async fn start<F>(handler: F) -> Self
    where
        F: Fn(u32, &str) -> (u32, Vec<u8>) + Send + Sync + 'static,
    {
        Self::spawn(Some(Arc::new(handler))).await
    }

    /// Read each request and hang up without replying
    pub(crate) async fn start_hangup() -> Self {
        Self::spawn::<fn(u32, &str) -> (u32, Vec<u8>)>(None).await
    }

    async fn spawn<F>(handler: Option<Arc<F>>) -> Self
    where
        F: Fn(u32, &str) -> (u32, Vec<u8>) + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("sway-ipc.sock");
        let listener = UnixListener::bind(&path).expect("Failed to bind mock socket");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let requests = requests.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let requests = requests.clone();
                    let handler = handler.clone();

                    tokio::spawn(async move {
                        let mut transport = Transport::new(stream);
                        while let Ok(frame) = transport.read_frame().await {
                            let header = codec::decode_header(&frame).expect("valid header");
                            let payload =
                                String::from_utf8_lossy(&frame[codec::HEADER_LEN..]).into_owned();
                            requests
                                .lock()
                                .unwrap()
                                .push((header.kind, payload.clone()));

                            let Some(handler) = handler.as_deref() else {
                                break;
                            };
                            let (kind, body) = handler(header.kind, &payload);
                            if transport.send(kind, &body).await.is_err() {
                                break;
                            }
                        }
                    });
                }
            })
        };

        Self {
            _dir: dir,
            path,
            requests,
            connections,
            task,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Every request received so far, as (type, payload text)
    pub(crate) fn requests(&self) -> Vec<(u32, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of connections accepted so far
    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockSway {
    fn drop(&mut self) {
        self.task.abort();
    }
}
