//! Envelope wire format.
//!
//! Every message starts with a fixed 12-byte header:
//! ```text
//! ┌──────┬──────────┬───────────┬────────────────┬───────────┐
//! │ Type │ Reserved │ Method ID │ Correlation ID │ Body len  │
//! │ 1 B  │ 1 B      │ 2 bytes   │ 4 bytes        │ 4 bytes   │
//! │ u8   │ zero     │ u16 LE    │ u32 LE         │ u32 LE    │
//! └──────┴──────────┴───────────┴────────────────┴───────────┘
//! ```
//! The body follows immediately. All multi-byte integers are Little Endian
//! regardless of host byte order. The reserved byte is written as zero and
//! ignored on read.

use crate::error::{ErrorCode, Result, RpcError};

/// Header size in bytes (fixed, exactly 12).
pub const HEADER_SIZE: usize = 12;

/// Correlation id stamped on outbound Notification frames. Receivers ignore
/// the id field for Notifications.
pub const NOTIFICATION_ID: u32 = 0;

/// All-ones correlation id stamped on Error Response frames emitted before a
/// trustworthy id could be parsed.
pub const GENERIC_ID: u32 = u32::MAX;

/// Message type, the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Expects a Response or Error Response correlated by id.
    Request = 0,
    /// Fire-and-forget; never answered.
    Notification = 1,
    /// Completes a Request.
    Response = 2,
    /// Fails a Request; body carries a signed code and a UTF-8 message.
    ErrorResponse = 3,
}

impl MsgType {
    /// Decode the type byte. Returns `None` for undefined values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MsgType::Request),
            1 => Some(MsgType::Notification),
            2 => Some(MsgType::Response),
            3 => Some(MsgType::ErrorResponse),
            _ => None,
        }
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message type.
    pub msg_type: MsgType,
    /// Method identifier (0–65535; any value is valid on the wire).
    pub method: u16,
    /// Correlation id linking a Request with its completion.
    pub id: u32,
    /// Body length in bytes.
    pub body_len: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(msg_type: MsgType, id: u32, method: u16, body_len: u32) -> Self {
        Self {
            msg_type,
            method,
            id,
            body_len,
        }
    }

    /// Encode the header to bytes (Little Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than [`HEADER_SIZE`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.msg_type as u8;
        buf[1] = 0;
        buf[2..4].copy_from_slice(&self.method.to_le_bytes());
        buf[4..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.body_len.to_le_bytes());
    }

    /// Decode a header from bytes (Little Endian).
    ///
    /// Fails with a parse error when the buffer is shorter than
    /// [`HEADER_SIZE`] or the type byte is undefined. The reserved byte is
    /// ignored whatever its value.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(RpcError::new(ErrorCode::ParseError, "Message too short"));
        }
        let msg_type = MsgType::from_u8(buf[0]).ok_or_else(|| {
            RpcError::new(
                ErrorCode::ParseError,
                format!("Unknown message type {}", buf[0]),
            )
        })?;
        Ok(Self {
            msg_type,
            method: u16::from_le_bytes([buf[2], buf[3]]),
            id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            body_len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}
