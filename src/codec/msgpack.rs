//! MsgPack body codec using `rmp-serde`.
//!
//! Bodies are encoded with `to_vec_named` so structs serialize as maps with
//! field names rather than positional arrays. That keeps bodies
//! self-describing for peers written in other languages, which address
//! fields by name.

use crate::error::Result;

/// MessagePack codec for message bodies.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
