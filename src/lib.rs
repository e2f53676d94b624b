//! # wirepeer
//!
//! Schema-driven, transport-agnostic binary RPC peer.
//!
//! A [`Peer`] is one bidirectional endpoint. It encodes Requests,
//! Notifications, Responses, and Error Responses into a compact
//! fixed-header binary format, routes inbound frames to registered handlers
//! or awaiting callers, tracks in-flight requests with timeout enforcement,
//! and exposes handler registration with a chained guard model.
//!
//! ## Wire format
//!
//! Every message is a 12-byte little-endian header followed by the body:
//!
//! ```text
//! ┌──────┬──────────┬───────────┬────────────────┬───────────┐
//! │ Type │ Reserved │ Method ID │ Correlation ID │ Body len  │
//! │ u8   │ zero     │ u16 LE    │ u32 LE         │ u32 LE    │
//! └──────┴──────────┴───────────┴────────────────┴───────────┘
//! ```
//!
//! Bodies are opaque MsgPack blobs described by a [`Schema`] mapping method
//! ids to body types. The transport is the caller's: the peer hands complete
//! encoded frames to a sink function and is fed complete frames through
//! [`Peer::from_transport`]. Length-prefixing over streaming transports is
//! the caller's responsibility.
//!
//! ## Example
//!
//! ```ignore
//! use wirepeer::{Peer, RpcError, Schema};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct AddParams { a: i32, b: i32 }
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct AddResult { result: i32 }
//!
//! let schema = Schema::new().method::<AddParams, AddResult>(0);
//! let peer: Peer = Peer::new(schema);
//!
//! peer.set_transport_sink(|bytes, _app| {
//!     // hand bytes to the transport
//! });
//! peer.register_handler(0, |req: AddParams, _app| async move {
//!     Ok(AddResult { result: req.a + req.b })
//! });
//!
//! // inbound frames: peer.from_transport(&bytes, ());
//! // outbound calls: peer.request::<AddParams, AddResult>(0, &params, &()).await;
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod schema;

mod peer;
mod pending;

pub use error::{ErrorCode, Result, RpcError};
pub use handler::HandlerHandle;
pub use peer::{Peer, PeerConfig, TransportSink, DEFAULT_REQUEST_TIMEOUT};
pub use schema::{MethodDescriptor, Schema};
