//! Codec module: body serialization.
//!
//! Bodies are opaque MsgPack blobs. [`MsgPackCodec`] is the stateless
//! encode/decode entry point; [`EncodeBuilder`] is the reusable buffer the
//! peer serializes outbound bodies into.

mod builder;
mod msgpack;

pub use builder::{EncodeBuilder, DEFAULT_BUILDER_CAPACITY};
pub use msgpack::MsgPackCodec;
