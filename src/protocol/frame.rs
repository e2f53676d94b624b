//! Frame assembly and parsing on top of the envelope header.
//!
//! A frame is one complete encoded message: header plus body. This layer
//! does not do transport framing; callers hand [`decode_frame`] exactly one
//! complete message at a time.

use super::wire_format::{Header, MsgType, HEADER_SIZE};
use crate::error::{ErrorCode, Result, RpcError};

/// Error bodies start with a 4-byte signed code.
pub const ERROR_CODE_SIZE: usize = 4;

/// A decoded inbound frame. The body borrows from the input buffer, so
/// nothing is copied until a value is actually constructed from it.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Decoded header.
    pub header: Header,
    /// Body bytes, exactly `header.body_len` long.
    pub body: &'a [u8],
}

impl FrameView<'_> {
    /// Get the message type.
    #[inline]
    pub fn msg_type(&self) -> MsgType {
        self.header.msg_type
    }

    /// Get the correlation id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.header.id
    }

    /// Get the method id.
    #[inline]
    pub fn method(&self) -> u16 {
        self.header.method
    }
}

/// Encode a complete frame: header and body in a single allocation.
///
/// The body length field is always the exact length of `body`; there are
/// never trailing bytes.
pub fn encode_frame(msg_type: MsgType, id: u32, method: u16, body: &[u8]) -> Vec<u8> {
    let header = Header::new(msg_type, id, method, body.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}

/// Encode an Error Response frame.
///
/// The body is the signed 32-bit code followed by the UTF-8 message with no
/// length prefix. The method field is always written as 0; receivers
/// correlate errors by id alone.
pub fn encode_error_frame(id: u32, code: i32, message: &str) -> Vec<u8> {
    let text = message.as_bytes();
    let mut body = Vec::with_capacity(ERROR_CODE_SIZE + text.len());
    body.extend_from_slice(&code.to_le_bytes());
    body.extend_from_slice(text);
    encode_frame(MsgType::ErrorResponse, id, 0, &body)
}

/// Decode one complete frame, borrowing the body from `bytes`.
///
/// Fails with a parse error when the buffer is shorter than the header or
/// shorter than the length the header claims.
pub fn decode_frame(bytes: &[u8]) -> Result<FrameView<'_>> {
    let header = Header::decode(bytes)?;
    let total = HEADER_SIZE + header.body_len as usize;
    if bytes.len() < total {
        return Err(RpcError::new(ErrorCode::ParseError, "Incomplete message"));
    }
    Ok(FrameView {
        header,
        body: &bytes[HEADER_SIZE..total],
    })
}

/// Decode an error body into its code and message.
///
/// The message is decoded tolerantly; invalid UTF-8 from a foreign peer is
/// replaced rather than rejected.
pub fn decode_error_body(body: &[u8]) -> Result<(i32, String)> {
    if body.len() < ERROR_CODE_SIZE {
        return Err(RpcError::new(ErrorCode::ParseError, "Error body too short"));
    }
    let code = i32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let message = String::from_utf8_lossy(&body[ERROR_CODE_SIZE..]).into_owned();
    Ok((code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let bytes = encode_frame(MsgType::Request, 42, 7, b"hello");
        let frame = decode_frame(&bytes).unwrap();

        assert_eq!(frame.msg_type(), MsgType::Request);
        assert_eq!(frame.id(), 42);
        assert_eq!(frame.method(), 7);
        assert_eq!(frame.body, b"hello");
        assert_eq!(frame.header.body_len, 5);
    }

    #[test]
    fn test_reencode_is_byte_identical() {
        let original = encode_frame(MsgType::Notification, 0, 65535, b"payload");
        let frame = decode_frame(&original).unwrap();
        let reencoded = encode_frame(frame.msg_type(), frame.id(), frame.method(), frame.body);
        assert_eq!(reencoded, original);
    }

    #[test]
    fn test_empty_body() {
        let bytes = encode_frame(MsgType::Response, 3, 3, &[]);
        assert_eq!(bytes.len(), HEADER_SIZE);

        let frame = decode_frame(&bytes).unwrap();
        assert!(frame.body.is_empty());
        assert_eq!(frame.header.body_len, 0);
    }

    #[test]
    fn test_decode_short_frame() {
        let err = decode_frame(&[0u8; 5]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
        assert_eq!(err.message, "Message too short");
    }

    #[test]
    fn test_decode_truncated_body() {
        let mut bytes = encode_frame(MsgType::Request, 1, 1, b"0123456789");
        bytes.truncate(bytes.len() - 3);
        let err = decode_frame(&bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
        assert_eq!(err.message, "Incomplete message");
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_frame(MsgType::Request, 1, 1, b"body");
        bytes.extend_from_slice(b"extra");
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.body, b"body");
    }

    #[test]
    fn test_error_frame_method_is_zero() {
        let bytes = encode_error_frame(9, 1002, "Method not found");
        let frame = decode_frame(&bytes).unwrap();

        assert_eq!(frame.msg_type(), MsgType::ErrorResponse);
        assert_eq!(frame.method(), 0);
        assert_eq!(frame.id(), 9);
    }

    #[test]
    fn test_error_body_roundtrip() {
        let bytes = encode_error_frame(9, -32000, "boom");
        let frame = decode_frame(&bytes).unwrap();
        let (code, message) = decode_error_body(frame.body).unwrap();

        assert_eq!(code, -32000);
        assert_eq!(message, "boom");
    }

    #[test]
    fn test_error_body_empty_message() {
        let bytes = encode_error_frame(1, 1000, "");
        let frame = decode_frame(&bytes).unwrap();
        let (code, message) = decode_error_body(frame.body).unwrap();

        assert_eq!(code, 1000);
        assert!(message.is_empty());
    }

    #[test]
    fn test_error_body_too_short() {
        let err = decode_error_body(&[1, 2]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_error_body_invalid_utf8_is_replaced() {
        let mut body = 1007i32.to_le_bytes().to_vec();
        body.extend_from_slice(&[0x66, 0xFF, 0x6F]);
        let (code, message) = decode_error_body(&body).unwrap();

        assert_eq!(code, 1007);
        assert!(message.contains('\u{FFFD}'));
    }
}
