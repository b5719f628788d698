//! Frame encoding and decoding
//!
//! Every message on the socket is a 14-byte header followed by a JSON
//! payload:
//!
//! ```text
//! +----------+-------------+-----------+------------------+
//! | "i3-ipc" | length (LE) | type (LE) | payload (length) |
//! | 6 bytes  | u32         | u32       | UTF-8 JSON       |
//! +----------+-------------+-----------+------------------+
//! ```
//!
//! Nothing in here does I/O; see `transport` for reading frames off a socket.

use serde_json::Value;

use crate::error::IpcError;

/// Protocol tag at the start of every frame
pub const MAGIC: &[u8; 6] = b"i3-ipc";

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 14;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Number of payload bytes following the header
    pub length: u32,
    /// Raw type code, including the event marker bit if set
    pub kind: u32,
}

impl Header {
    /// Total frame size implied by this header
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.length as usize
    }
}

/// Build a frame from a type code and payload bytes
pub fn encode(kind: u32, payload: &[u8]) -> Result<Vec<u8>, IpcError> {
    let length = u32::try_from(payload.len())
        .map_err(|_| IpcError::PayloadTooLarge { len: payload.len() })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&kind.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parse the 14-byte header at the start of `bytes`
///
/// Extra bytes after the header are ignored.
pub fn decode_header(bytes: &[u8]) -> Result<Header, IpcError> {
    if bytes.len() < HEADER_LEN {
        return Err(IpcError::ShortHeader { len: bytes.len() });
    }

    if &bytes[..6] != MAGIC {
        return Err(IpcError::BadMagic {
            found: bytes[..6].to_vec(),
        });
    }

    let length = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let kind = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

    Ok(Header { length, kind })
}

/// Decode `length` payload bytes starting at offset 14 as JSON
pub fn decode_payload(bytes: &[u8], length: u32) -> Result<Value, IpcError> {
    let length = length as usize;
    let end = HEADER_LEN + length;
    if bytes.len() < end {
        return Err(IpcError::TruncatedFrame {
            expected: length,
            received: bytes.len().saturating_sub(HEADER_LEN),
        });
    }

    let raw = &bytes[HEADER_LEN..end];
    let text = std::str::from_utf8(raw).map_err(|source| IpcError::InvalidUtf8 {
        text: String::from_utf8_lossy(raw).into_owned(),
        source,
    })?;

    serde_json::from_str(text).map_err(|source| IpcError::InvalidJson {
        text: text.to_string(),
        source,
    })
}

/// Decode a complete frame into its raw type code and JSON payload
pub fn decode(frame: &[u8]) -> Result<(u32, Value), IpcError> {
    let header = decode_header(frame)?;
    let payload = decode_payload(frame, header.length)?;
    Ok((header.kind, payload))
}
