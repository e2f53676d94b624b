//! Protocol module: envelope wire format and frame assembly.
//!
//! This module implements the binary envelope:
//! - 12-byte header encoding/decoding
//! - frame assembly for Requests, Notifications, Responses, Error Responses
//! - the error-body layout (signed code + UTF-8 message)

mod frame;
mod wire_format;

pub use frame::{
    decode_error_body, decode_frame, encode_error_frame, encode_frame, FrameView, ERROR_CODE_SIZE,
};
pub use wire_format::{Header, MsgType, GENERIC_ID, HEADER_SIZE, NOTIFICATION_ID};
