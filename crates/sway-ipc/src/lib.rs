//! Sway IPC client
//!
//! Talks to the sway (or i3) compositor over its Unix domain socket.
//!
//! ## Architecture
//!
//! - `codec`: encode/decode of the 14-byte header and JSON payload, no I/O
//! - `Transport`: one socket connection; writes whole frames and reads until
//!   a complete frame has arrived
//! - `SwayClient`: one connection per request, one reply per request
//! - `Subscription`: one long-lived connection delivering pushed events
//!
//! ## Protocol
//!
//! Every message is `"i3-ipc"`, a little-endian `u32` payload length, a
//! little-endian `u32` message type, then the JSON payload. Replies echo the
//! request type. Events pushed after `SUBSCRIBE` set the high bit of the type.
//!
//! Payloads are treated as opaque JSON; nothing here interprets sway's tree,
//! output, or command semantics.

pub mod codec;
mod client;
mod error;
mod events;
mod transport;
mod types;

#[cfg(test)]
mod test_support;

pub use client::{get_socket_path, ClientConfig, SwayClient};
pub use error::{ErrorCategory, IpcError};
pub use events::{subscribe, subscribe_with_buffer, EventStream, Subscription, DEFAULT_CHANNEL_BUFFER};
pub use transport::Transport;
pub use types::{Event, EventKind, RequestKind, EVENT_BIT};
