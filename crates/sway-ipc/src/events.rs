//! Event subscriptions
//!
//! Unlike `SwayClient` requests, a subscription keeps its connection open
//! and receives a continuous sequence of pushed event frames.
//!
//! ## Protocol
//!
//! 1. Connect to the sway socket (separate connection from any request)
//! 2. Send `SUBSCRIBE` with a JSON array of event names, e.g. `["window"]`
//! 3. Receive the acknowledgement, e.g. `{"success":true}`
//! 4. Continuously receive event frames until the connection closes
//!
//! After the subscription is acknowledged the socket only carries events.
//!
//! ## Architecture
//!
//! ```text
//! +-------------+      +---------+      +--------------+
//! | EventStream | ---> | mpsc    | ---> | Subscription |
//! | (reader     |      | channel |      | (Stream)     |
//! |  task)      |      |         |      |              |
//! +-------------+      +---------+      +--------------+
//! ```
//!
//! The reader task owns the connection. It stops, and the connection is
//! closed, when the subscription is cancelled or dropped, when sway closes the
//! socket, or on any read/decode failure. The consumer just sees the stream
//! end.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::client::SwayClient;
use crate::codec;
use crate::error::IpcError;
use crate::transport::Transport;
use crate::types::{Event, EventKind, RequestKind};

/// Default channel buffer size between the reader task and the consumer
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// A subscribed connection, read directly
///
/// Most callers want [`Subscription`], which runs the read loop on its own
/// task. `EventStream` is the building block underneath it.
#[derive(Debug)]
pub struct EventStream {
    transport: Transport,
    ack: Value,
}

impl EventStream {
    /// Open a connection and subscribe to `kinds`
    ///
    /// # Errors
    ///
    /// Any connection error from opening the socket.
    /// Returns `IpcError::Timeout` if a reply timeout is configured and the
    /// acknowledgement does not arrive in time.
    /// Returns `IpcError::UnexpectedReplyType` if the first reply is not a
    /// SUBSCRIBE reply.
    /// Returns `IpcError::SubscriptionRejected` if sway answers
    /// `{"success": false}`.
    pub async fn connect(client: &SwayClient, kinds: &[EventKind]) -> Result<Self, IpcError> {
        let payload = serde_json::to_string(kinds).map_err(IpcError::SerializeFailed)?;

        let mut transport = client.connect().await?;
        let handshake = match client.config().reply_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::handshake(&mut transport, &payload))
                .await
                .unwrap_or(Err(IpcError::Timeout(limit))),
            None => Self::handshake(&mut transport, &payload).await,
        };
        match handshake {
            Ok(ack) => {
                info!(events = %payload, "Subscribed to sway events");
                Ok(Self { transport, ack })
            }
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(transport: &mut Transport, payload: &str) -> Result<Value, IpcError> {
        let code = RequestKind::Subscribe.code();
        transport.send(code, payload.as_bytes()).await?;

        let frame = transport.read_frame().await?;
        let (reply_kind, ack) = codec::decode(&frame)?;

        if reply_kind != code {
            return Err(IpcError::UnexpectedReplyType {
                expected: RequestKind::Subscribe,
                got: reply_kind,
            });
        }

        if ack.get("success") == Some(&Value::Bool(false)) {
            return Err(IpcError::SubscriptionRejected { reply: ack });
        }

        Ok(ack)
    }

    /// The acknowledgement sway sent in reply to SUBSCRIBE
    pub fn ack(&self) -> &Value {
        &self.ack
    }

    /// Wait for the next event
    ///
    /// Frames with an event code this client does not know are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` once sway hangs up.
    /// Returns any framing or decode error from the frame being read.
    pub async fn next_event(&mut self) -> Result<Event, IpcError> {
        loop {
            let frame = self.transport.read_frame().await?;
            let (code, payload) = codec::decode(&frame)?;

            match EventKind::from_code(code) {
                Some(kind) => {
                    debug!(event = %kind, "Received sway event");
                    return Ok(Event { kind, payload });
                }
                None => {
                    warn!(code = code, "Ignoring sway event with unknown type");
                }
            }
        }
    }

    /// Close the connection
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

/// A live subscription, consumed as a [`Stream`] of [`Event`]s
///
/// The stream is unbounded while sway keeps the connection open. It ends
/// after [`Subscription::cancel`], or once the connection closes or fails.
/// Dropping the subscription cancels it.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut sub = client.subscribe(&[EventKind::Window]).await?;
/// while let Some(event) = sub.next().await {
///     println!("{}: {}", event.kind, event.payload["change"]);
/// }
/// ```
#[derive(Debug)]
pub struct Subscription {
    ack: Value,
    events: ReceiverStream<Event>,
    /// `None` once cancelled
    cancel: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
}

impl Subscription {
    /// The acknowledgement sway sent in reply to SUBSCRIBE
    pub fn ack(&self) -> &Value {
        &self.ack
    }

    /// Stop the subscription and close its connection
    ///
    /// The stream yields `None` from here on. Calling this more than once is
    /// harmless.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // the reader may already have exited
            let _ = cancel.send(());
            debug!("Sway event subscription cancelled");
        }
    }

    /// Whether the reader task has stopped and released the connection
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        if this.cancel.is_none() {
            return Poll::Ready(None);
        }
        Pin::new(&mut this.events).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Subscribe to `kinds` with the default channel buffer
pub async fn subscribe(client: &SwayClient, kinds: &[EventKind]) -> Result<Subscription, IpcError> {
    subscribe_with_buffer(client, kinds, DEFAULT_CHANNEL_BUFFER).await
}

/// Subscribe to `kinds`, buffering up to `buffer_size` unread events
///
/// The subscription handshake happens before this returns, so connection
/// and rejection errors surface here. Everything after that ends the stream
/// instead of producing an error.
pub async fn subscribe_with_buffer(
    client: &SwayClient,
    kinds: &[EventKind],
    buffer_size: usize,
) -> Result<Subscription, IpcError> {
    let stream = match EventStream::connect(client, kinds).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                request = ?RequestKind::Subscribe,
                events = ?kinds,
                error = %e,
                "Sway event subscription failed"
            );
            return Err(e);
        }
    };

    let ack = stream.ack().clone();
    let (sender, receiver) = mpsc::channel(buffer_size);
    let (cancel_tx, cancel_rx) = oneshot::channel();

    let reader = tokio::spawn(run_reader_loop(stream, sender, cancel_rx));

    Ok(Subscription {
        ack,
        events: ReceiverStream::new(receiver),
        cancel: Some(cancel_tx),
        reader,
    })
}

/// Read events and forward them until cancelled, disconnected, or failed
async fn run_reader_loop(
    mut stream: EventStream,
    sender: mpsc::Sender<Event>,
    mut cancel: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            _ = &mut cancel => {
                debug!("Stopping sway event reader");
                break;
            }
            result = stream.next_event() => match result {
                Ok(event) => event,
                Err(e) if e.is_disconnect() => {
                    info!("Sway event stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Sway event stream error, ending subscription");
                    break;
                }
            },
        };

        tokio::select! {
            _ = &mut cancel => {
                debug!("Stopping sway event reader");
                break;
            }
            sent = sender.send(event) => {
                if sent.is_err() {
                    debug!("Sway event receiver dropped, shutting down event reader");
                    break;
                }
            }
        }
    }

    stream.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::types::EVENT_BIT;
    use futures::StreamExt;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{UnixListener, UnixStream};

    fn bind() -> (TempDir, PathBuf, UnixListener) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("sway-ipc.sock");
        let listener = UnixListener::bind(&path).expect("Failed to bind mock socket");
        (dir, path, listener)
    }

    fn event_frame(kind: EventKind, payload: Value) -> Vec<u8> {
        codec::encode(EVENT_BIT | kind.code(), payload.to_string().as_bytes()).unwrap()
    }

    /// Accept one connection, check the SUBSCRIBE request, and acknowledge it
    async fn accept_subscribe(listener: &UnixListener, ack: Value) -> (UnixStream, String) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = Transport::new(stream);
        let frame = transport.read_frame().await.unwrap();
        let header = codec::decode_header(&frame).unwrap();
        assert_eq!(header.kind, RequestKind::Subscribe.code());
        let payload = String::from_utf8(frame[codec::HEADER_LEN..].to_vec()).unwrap();

        transport
            .send(RequestKind::Subscribe.code(), ack.to_string().as_bytes())
            .await
            .unwrap();

        // hand the raw socket back so the test can script the rest
        let stream = transport.into_inner().expect("transport still open");
        (stream, payload)
    }

    #[tokio::test]
    async fn test_subscribe_window_scenario() {
        let (_dir, path, listener) = bind();

        let server = tokio::spawn(async move {
            let (mut stream, payload) = accept_subscribe(&listener, json!({"success": true})).await;
            stream
                .write_all(&event_frame(EventKind::Window, json!({"change": "focus"})))
                .await
                .unwrap();
            // dropping the stream closes the socket
            payload
        });

        let client = SwayClient::new(&path);
        let mut sub = client.subscribe(&[EventKind::Window]).await.unwrap();

        assert_eq!(sub.ack(), &json!({"success": true}));
        assert_eq!(
            sub.next().await,
            Some(Event {
                kind: EventKind::Window,
                payload: json!({"change": "focus"}),
            })
        );
        assert_eq!(sub.next().await, None);

        assert_eq!(server.await.unwrap(), r#"["window"]"#);
    }

    #[tokio::test]
    async fn test_subscribe_payload_lists_event_names() {
        let (_dir, path, listener) = bind();

        let server =
            tokio::spawn(async move { accept_subscribe(&listener, json!({"success": true})).await.1 });

        let client = SwayClient::new(&path);
        let kinds = [EventKind::Workspace, EventKind::BarConfigUpdate, EventKind::Input];
        let sub = client.subscribe(&kinds).await.unwrap();
        drop(sub);

        assert_eq!(
            server.await.unwrap(),
            r#"["workspace","barconfig_update","input"]"#
        );
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let (mut stream, _) = accept_subscribe(&listener, json!({"success": true})).await;
            let mut frames = Vec::new();
            for num in 1..=5 {
                frames.extend(event_frame(
                    EventKind::Workspace,
                    json!({"change": "focus", "current": {"num": num}}),
                ));
            }
            // one write, many frames
            stream.write_all(&frames).await.unwrap();
        });

        let client = SwayClient::new(&path);
        let sub = client.subscribe(&[EventKind::Workspace]).await.unwrap();
        let events: Vec<Event> = sub.collect().await;

        let nums: Vec<i64> = events
            .iter()
            .map(|e| e.payload["current"]["num"].as_i64().unwrap())
            .collect();
        assert_eq!(nums, vec![1, 2, 3, 4, 5]);
        assert!(events.iter().all(|e| e.kind == EventKind::Workspace));
    }

    #[tokio::test]
    async fn test_rejected_subscription() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let _ = accept_subscribe(&listener, json!({"success": false})).await;
        });

        let client = SwayClient::new(&path);
        let err = client.subscribe(&[EventKind::Tick]).await.unwrap_err();

        match &err {
            IpcError::SubscriptionRejected { reply } => {
                assert_eq!(reply, &json!({"success": false}));
            }
            other => panic!("Expected SubscriptionRejected, got: {:?}", other),
        }
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[tokio::test]
    async fn test_unknown_event_codes_are_skipped() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let (mut stream, _) = accept_subscribe(&listener, json!({"success": true})).await;
            let unknown = codec::encode(EVENT_BIT | 0x99, b"{}").unwrap();
            stream.write_all(&unknown).await.unwrap();
            stream
                .write_all(&event_frame(EventKind::Mode, json!({"change": "resize"})))
                .await
                .unwrap();
        });

        let client = SwayClient::new(&path);
        let sub = client.subscribe(&[EventKind::Mode]).await.unwrap();
        let events: Vec<Event> = sub.collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Mode);
    }

    #[tokio::test]
    async fn test_truncated_event_ends_stream() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let (mut stream, _) = accept_subscribe(&listener, json!({"success": true})).await;
            stream
                .write_all(&event_frame(EventKind::Binding, json!({"change": "run"})))
                .await
                .unwrap();
            let partial = event_frame(EventKind::Binding, json!({"change": "run"}));
            stream.write_all(&partial[..partial.len() - 4]).await.unwrap();
        });

        let client = SwayClient::new(&path);
        let sub = client.subscribe(&[EventKind::Binding]).await.unwrap();
        let events: Vec<Event> = sub.collect().await;

        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_closes_connection() {
        let (_dir, path, listener) = bind();

        let server = tokio::spawn(async move {
            let (mut stream, _) = accept_subscribe(&listener, json!({"success": true})).await;
            // the client's cancel shows up as EOF here
            let mut buf = [0u8; 16];
            stream.read(&mut buf).await.unwrap()
        });

        let client = SwayClient::new(&path);
        let mut sub = client.subscribe(&[EventKind::Window]).await.unwrap();

        sub.cancel();
        sub.cancel();
        assert_eq!(sub.next().await, None);

        let read = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should see the connection close")
            .unwrap();
        assert_eq!(read, 0);

        for _ in 0..100 {
            if sub.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(sub.is_finished());
    }

    #[tokio::test]
    async fn test_drop_closes_connection() {
        let (_dir, path, listener) = bind();

        let server = tokio::spawn(async move {
            let (mut stream, _) = accept_subscribe(&listener, json!({"success": true})).await;
            let mut buf = [0u8; 16];
            stream.read(&mut buf).await.unwrap()
        });

        let client = SwayClient::new(&path);
        let sub = client.subscribe(&[EventKind::Shutdown]).await.unwrap();
        drop(sub);

        let read = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should see the connection close")
            .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_event_stream_direct() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let (mut stream, _) = accept_subscribe(&listener, json!({"success": true})).await;
            stream
                .write_all(&event_frame(EventKind::Tick, json!({"first": false, "payload": "hi"})))
                .await
                .unwrap();
        });

        let client = SwayClient::new(&path);
        let mut stream = EventStream::connect(&client, &[EventKind::Tick]).await.unwrap();

        assert_eq!(stream.ack(), &json!({"success": true}));
        let event = stream.next_event().await.unwrap();
        assert_eq!(event.kind, EventKind::Tick);
        assert_eq!(event.payload["payload"], "hi");

        let err = stream.next_event().await.unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed), "{:?}", err);
        stream.close().await;
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_socket() {
        let (_dir, path, listener) = bind();
        drop(listener);
        std::fs::remove_file(&path).unwrap();

        let client = SwayClient::new(&path);
        let err = client.subscribe(&[EventKind::Window]).await.unwrap_err();

        assert!(matches!(err, IpcError::SocketNotFound { .. }), "{:?}", err);
    }
}
