//! Error types for sway IPC operations

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::RequestKind;

/// Broad failure classes, used by callers that only care about what went wrong
/// at the protocol level rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket missing, refused, or dropped mid-read/write
    Connection,
    /// Malformed or unexpected frame
    Protocol,
    /// Payload bytes are not UTF-8 JSON, or a request could not be serialized
    Encoding,
}

/// Errors that can occur when communicating with the compositor
#[derive(Debug, Error)]
pub enum IpcError {
    /// Neither SWAYSOCK nor I3SOCK is set
    #[error("Neither SWAYSOCK nor I3SOCK environment variable is set - is sway running?")]
    SocketNotSet,

    /// The socket path does not exist
    #[error("Sway socket not found at {path}")]
    SocketNotFound { path: PathBuf },

    /// Failed to connect to the socket
    #[error("Failed to connect to sway socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a frame
    #[error("Failed to send request to sway: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to read a frame
    #[error("Failed to receive message from sway: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer closed the connection before a frame header arrived
    #[error("Connection to sway closed unexpectedly")]
    ConnectionClosed,

    /// Maximum connection attempts exceeded
    #[error("Failed to connect to sway after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    /// No reply arrived within the configured timeout
    #[error("No reply from sway within {0:?}")]
    Timeout(Duration),

    /// Fewer than 14 bytes were available for the header
    #[error("Frame header too short: got {len} bytes, need 14")]
    ShortHeader { len: usize },

    /// The frame did not start with the `i3-ipc` tag
    #[error("Invalid magic in frame header: {found:?}")]
    BadMagic { found: Vec<u8> },

    /// The stream ended before the declared payload length was read
    #[error("Truncated frame: expected {expected} payload bytes, got {received}")]
    TruncatedFrame { expected: usize, received: usize },

    /// The payload does not fit the 32-bit length field
    #[error("Payload of {len} bytes exceeds the 32-bit length field")]
    PayloadTooLarge { len: usize },

    /// The reply type did not echo the request type
    #[error("Unexpected reply type {got} to {expected:?} request")]
    UnexpectedReplyType { expected: RequestKind, got: u32 },

    /// Sway refused the subscription
    #[error("Sway rejected the subscription: {reply}")]
    SubscriptionRejected { reply: serde_json::Value },

    /// Payload bytes are not valid UTF-8
    #[error("Payload is not valid UTF-8: {source}")]
    InvalidUtf8 {
        /// Lossy rendering of the raw payload, for debugging
        text: String,
        #[source]
        source: std::str::Utf8Error,
    },

    /// Payload is UTF-8 but not valid JSON
    #[error("Payload is not valid JSON: {source}")]
    InvalidJson {
        /// The raw payload text
        text: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize a request payload to JSON
    #[error("Failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),
}

impl IpcError {
    /// The failure class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SocketNotSet
            | Self::SocketNotFound { .. }
            | Self::ConnectionFailed { .. }
            | Self::SendFailed(_)
            | Self::ReceiveFailed(_)
            | Self::ConnectionClosed
            | Self::MaxRetriesExceeded { .. }
            | Self::Timeout(_) => ErrorCategory::Connection,
            Self::ShortHeader { .. }
            | Self::BadMagic { .. }
            | Self::TruncatedFrame { .. }
            | Self::PayloadTooLarge { .. }
            | Self::UnexpectedReplyType { .. }
            | Self::SubscriptionRejected { .. } => ErrorCategory::Protocol,
            Self::InvalidUtf8 { .. } | Self::InvalidJson { .. } | Self::SerializeFailed(_) => {
                ErrorCategory::Encoding
            }
        }
    }

    /// Raw payload text carried by decode errors, if any
    pub fn payload_text(&self) -> Option<&str> {
        match self {
            Self::InvalidUtf8 { text, .. } | Self::InvalidJson { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Whether the error means the peer went away
    ///
    /// The subscription loop uses this to end the event sequence quietly.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::ReceiveFailed(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}
