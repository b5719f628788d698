//! Framed transport over a single socket connection
//!
//! A `Transport` owns one connection for its whole life. Request/reply
//! exchanges open a fresh transport per call; subscriptions keep one open
//! until the event stream ends. The connection is released when the
//! transport is closed or dropped, whichever comes first.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::codec::{self, HEADER_LEN};
use crate::error::IpcError;

/// Initial delay between connection attempts (100ms)
const INITIAL_RETRY_DELAY_MS: u64 = 100;

/// Maximum delay between connection attempts (1 second)
const MAX_RETRY_DELAY_MS: u64 = 1000;

/// Largest step the read buffer grows by while a payload arrives
const READ_CHUNK: usize = 64 * 1024;

/// One framed connection to the compositor
///
/// Generic over the byte stream so framing can be driven over in-memory
/// pipes; in practice this is a [`UnixStream`].
#[derive(Debug)]
pub struct Transport<S = UnixStream> {
    /// `None` once the transport has been closed
    stream: Option<S>,
}

impl Transport<UnixStream> {
    /// Connect to the Unix socket at `path`
    ///
    /// # Errors
    ///
    /// Returns `IpcError::SocketNotFound` if nothing exists at `path`.
    /// Returns `IpcError::ConnectionFailed` if the connection is refused or
    /// the path is not a socket.
    pub async fn open(path: &Path) -> Result<Self, IpcError> {
        if !path.exists() {
            return Err(IpcError::SocketNotFound {
                path: path.to_path_buf(),
            });
        }

        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| IpcError::ConnectionFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        debug!(path = %path.display(), "Connected to sway socket");

        Ok(Self::new(stream))
    }

    /// Connect with exponential backoff
    ///
    /// Makes one attempt plus up to `max_retries` retries. The delay starts
    /// at 100ms, doubles each retry, and is capped at 1 second. With
    /// `max_retries == 0` this is exactly [`Transport::open`].
    ///
    /// # Errors
    ///
    /// Returns `IpcError::MaxRetriesExceeded` if every attempt fails.
    pub async fn open_with_retry(path: &Path, max_retries: u32) -> Result<Self, IpcError> {
        if max_retries == 0 {
            return Self::open(path).await;
        }

        let mut attempt = 0;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        let last_error = loop {
            attempt += 1;

            match Self::open(path).await {
                Ok(transport) => return Ok(transport),
                Err(e) => {
                    if attempt > max_retries {
                        break e;
                    }

                    warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        delay_ms = delay_ms,
                        "Sway IPC connection failed, retrying..."
                    );

                    sleep(Duration::from_millis(delay_ms)).await;

                    delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
                }
            }
        };

        warn!(
            attempts = attempt,
            last_error = %last_error,
            path = %path.display(),
            "Failed to connect to sway after all retry attempts"
        );

        Err(IpcError::MaxRetriesExceeded { attempts: attempt })
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Whether [`Transport::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Take the underlying stream back out, if still open
    #[cfg(test)]
    pub(crate) fn into_inner(self) -> Option<S> {
        self.stream
    }

    fn stream_mut(&mut self) -> Result<&mut S, IpcError> {
        self.stream.as_mut().ok_or(IpcError::ConnectionClosed)
    }

    /// Write a complete frame and flush it
    ///
    /// Short writes are retried until every byte is sent.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), IpcError> {
        let stream = self.stream_mut()?;
        stream.write_all(frame).await.map_err(IpcError::SendFailed)?;
        stream.flush().await.map_err(IpcError::SendFailed)?;

        trace!(bytes = frame.len(), "Wrote frame");
        Ok(())
    }

    /// Encode and write one message
    pub async fn send(&mut self, kind: u32, payload: &[u8]) -> Result<(), IpcError> {
        let frame = codec::encode(kind, payload)?;
        self.write_frame(&frame).await
    }

    /// Read one complete frame, header included
    ///
    /// The payload may arrive in any number of chunks; reading continues
    /// until the length declared in the header has been accumulated.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` if the stream ends before a full
    /// header arrives.
    /// Returns `IpcError::ShortHeader`/`IpcError::BadMagic` for a malformed
    /// header.
    /// Returns `IpcError::TruncatedFrame` if the stream ends inside the
    /// payload.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, IpcError> {
        let stream = self.stream_mut()?;

        let mut head = [0u8; HEADER_LEN];
        stream.read_exact(&mut head).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                IpcError::ConnectionClosed
            } else {
                IpcError::ReceiveFailed(e)
            }
        })?;

        let header = codec::decode_header(&head)?;

        // The declared length is untrusted; the buffer only grows as bytes
        // actually arrive.
        let total = header.frame_len();
        let mut frame = Vec::with_capacity(total.min(HEADER_LEN + READ_CHUNK));
        frame.extend_from_slice(&head);

        let mut reads = 0usize;
        while frame.len() < total {
            let filled = frame.len();
            let step = (total - filled).min(READ_CHUNK);
            frame.resize(filled + step, 0);

            let n = stream
                .read(&mut frame[filled..])
                .await
                .map_err(IpcError::ReceiveFailed)?;
            frame.truncate(filled + n);

            if n == 0 {
                return Err(IpcError::TruncatedFrame {
                    expected: header.length as usize,
                    received: filled - HEADER_LEN,
                });
            }
            reads += 1;
        }

        trace!(
            kind = header.kind,
            length = header.length,
            reads = reads,
            "Read frame"
        );

        Ok(frame)
    }

    /// Release the connection
    ///
    /// Safe to call more than once. Dropping the transport has the same
    /// effect; this just makes the shutdown explicit.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // the peer may already be gone
            let _ = stream.shutdown().await;
            trace!("Closed transport");
        }
    }
}
