//! Request/reply client
//!
//! `SwayClient` opens a fresh connection for every request, so concurrent
//! calls never share a socket and can never see each other's replies.
//! Every exchange is: connect, write one frame, read one frame, close.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::error::IpcError;
use crate::events::{self, Subscription};
use crate::transport::Transport;
use crate::types::{EventKind, RequestKind};

/// Environment variable sway exports with its socket path
const SWAYSOCK_ENV: &str = "SWAYSOCK";

/// Environment variable i3 (and sway, for compatibility) exports
const I3SOCK_ENV: &str = "I3SOCK";

/// Payloads longer than this are elided from log lines
const MAX_LOGGED_PAYLOAD: usize = 128;

/// Discover the sway IPC socket path from the environment
///
/// Reads `SWAYSOCK`, falling back to `I3SOCK`, and validates that the path
/// exists.
///
/// # Errors
///
/// Returns `IpcError::SocketNotSet` if neither variable is set.
/// Returns `IpcError::SocketNotFound` if the path doesn't exist.
pub fn get_socket_path() -> Result<PathBuf, IpcError> {
    let socket_path_str = std::env::var(SWAYSOCK_ENV)
        .or_else(|_| std::env::var(I3SOCK_ENV))
        .map_err(|_| IpcError::SocketNotSet)?;

    let socket_path = PathBuf::from(&socket_path_str);

    if !socket_path.exists() {
        return Err(IpcError::SocketNotFound { path: socket_path });
    }

    Ok(socket_path)
}

/// Connection settings for [`SwayClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Path to the compositor's IPC socket
    pub socket_path: PathBuf,
    /// Extra connection attempts after the first fails (0 = no retry)
    pub connect_retries: u32,
    /// Give up waiting for a reply after this long
    ///
    /// `None` waits forever, which means an unresponsive compositor blocks
    /// the caller indefinitely.
    pub reply_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Settings for `socket_path` with no retries and no timeout
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_retries: 0,
            reply_timeout: None,
        }
    }
}

/// Client for sending commands and queries to sway
///
/// Cheap to clone; holds only configuration.
///
/// # Example
///
/// ```ignore
/// let client = SwayClient::new(get_socket_path()?);
/// let version = client.get_version().await?;
/// println!("sway {}", version["human_readable"]);
/// ```
#[derive(Debug, Clone)]
pub struct SwayClient {
    config: ClientConfig,
}

impl SwayClient {
    /// Create a client for the socket at `socket_path` with default settings
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_config(ClientConfig::new(socket_path))
    }

    /// Create a client with explicit settings
    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Create a client for the socket named by `$SWAYSOCK`/`$I3SOCK`
    pub fn from_env() -> Result<Self, IpcError> {
        Ok(Self::new(get_socket_path()?))
    }

    /// The socket this client connects to
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// The client's settings
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) async fn connect(&self) -> Result<Transport, IpcError> {
        Transport::open_with_retry(&self.config.socket_path, self.config.connect_retries).await
    }

    /// Send one request and wait for its reply
    ///
    /// Opens a new connection, writes the request, reads exactly one reply
    /// frame, and closes the connection whatever the outcome. Failures are
    /// logged here and returned to the caller.
    ///
    /// # Errors
    ///
    /// Connection errors, a reply whose type does not echo `kind`, or a
    /// payload that is not UTF-8 JSON.
    pub async fn send(&self, kind: RequestKind, payload: &str) -> Result<Value, IpcError> {
        let result = match self.config.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(kind, payload))
                .await
                .unwrap_or(Err(IpcError::Timeout(limit))),
            None => self.exchange(kind, payload).await,
        };

        if let Err(ref e) = result {
            warn!(
                request = ?kind,
                payload = %loggable(payload),
                error = %e,
                "Sway IPC request failed"
            );
        }

        result
    }

    async fn exchange(&self, kind: RequestKind, payload: &str) -> Result<Value, IpcError> {
        let mut transport = self.connect().await?;
        let result = Self::round_trip(&mut transport, kind, payload).await;
        transport.close().await;
        result
    }

    async fn round_trip(
        transport: &mut Transport,
        kind: RequestKind,
        payload: &str,
    ) -> Result<Value, IpcError> {
        debug!(request = ?kind, payload = %loggable(payload), "Sending request");

        transport.send(kind.code(), payload.as_bytes()).await?;
        let frame = transport.read_frame().await?;
        let (reply_kind, reply) = codec::decode(&frame)?;

        if reply_kind != kind.code() {
            return Err(IpcError::UnexpectedReplyType {
                expected: kind,
                got: reply_kind,
            });
        }

        Ok(reply)
    }

    /// Run one or more sway commands, e.g. `"border none"`
    ///
    /// The reply is an array with one `{"success": ...}` object per command.
    pub async fn run_command(&self, command: &str) -> Result<Value, IpcError> {
        self.send(RequestKind::RunCommand, command).await
    }

    /// List workspaces
    pub async fn get_workspaces(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetWorkspaces, "").await
    }

    /// List outputs
    pub async fn get_outputs(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetOutputs, "").await
    }

    /// Get the full layout tree
    pub async fn get_tree(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetTree, "").await
    }

    /// List container marks
    pub async fn get_marks(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetMarks, "").await
    }

    /// List the IDs of all configured bars
    pub async fn get_bar_config_ids(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetBarConfig, "").await
    }

    /// Get the configuration of one bar
    ///
    /// With no `bar_id`, the bar ID list is fetched first and the first bar is
    /// used. Returns `Ok(None)` when no bars are configured.
    pub async fn get_bar_config(&self, bar_id: Option<&str>) -> Result<Option<Value>, IpcError> {
        let bar_id = match bar_id {
            Some(id) => id.to_string(),
            None => {
                let ids = self.get_bar_config_ids().await?;
                match ids.as_array().and_then(|ids| ids.first()) {
                    Some(Value::String(id)) => id.clone(),
                    Some(other) => other.to_string(),
                    None => {
                        debug!("No bars configured");
                        return Ok(None);
                    }
                }
            }
        };

        self.send(RequestKind::GetBarConfig, &bar_id).await.map(Some)
    }

    /// Get the compositor version
    pub async fn get_version(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetVersion, "").await
    }

    /// List configured binding modes
    pub async fn get_binding_modes(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetBindingModes, "").await
    }

    /// Get the contents of the last loaded config file
    pub async fn get_config(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetConfig, "").await
    }

    /// Send a tick event with `payload` to all tick subscribers
    pub async fn send_tick(&self, payload: &str) -> Result<Value, IpcError> {
        self.send(RequestKind::SendTick, payload).await
    }

    /// Sync request (always answered with `{"success": false}` by sway)
    pub async fn sync(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::Sync, "").await
    }

    /// Get the currently active binding mode
    pub async fn get_binding_state(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetBindingState, "").await
    }

    /// List input devices
    pub async fn get_inputs(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetInputs, "").await
    }

    /// List seats
    pub async fn get_seats(&self) -> Result<Value, IpcError> {
        self.send(RequestKind::GetSeats, "").await
    }

    /// Subscribe to `kinds` on a dedicated connection
    ///
    /// See [`events::subscribe`].
    pub async fn subscribe(&self, kinds: &[EventKind]) -> Result<Subscription, IpcError> {
        events::subscribe(self, kinds).await
    }
}

/// Payload text as it should appear in a log line
pub(crate) fn loggable(payload: &str) -> String {
    if payload.len() <= MAX_LOGGED_PAYLOAD {
        return payload.to_string();
    }
    let mut end = MAX_LOGGED_PAYLOAD;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &payload[..end], payload.len())
}
