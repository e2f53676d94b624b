//! The peer: public operations and request lifecycle management.
//!
//! A [`Peer`] is one bidirectional RPC endpoint. Outbound, it serializes
//! bodies through the schema, wraps them in envelopes, and hands complete
//! frames to the transport sink. Inbound, [`Peer::from_transport`] decodes
//! one complete frame and routes it: Requests and Notifications to the
//! dispatcher, Responses and Error Responses to the waiter they correlate
//! with.
//!
//! The peer is `Clone` (a shared handle) and internally synchronized; locks
//! are short and never held across await points. Handler futures run on
//! spawned tasks, so `from_transport` returns as soon as dispatch is
//! scheduled.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::codec::{EncodeBuilder, DEFAULT_BUILDER_CAPACITY};
use crate::error::{ErrorCode, Result, RpcError};
use crate::handler::{DispatchOutcome, Dispatcher, HandlerEntry, HandlerHandle, TypedHandler};
use crate::pending::{Completion, PendingTable, Waiter};
use crate::protocol::{
    decode_error_body, decode_frame, encode_error_frame, encode_frame, Header, MsgType, GENERIC_ID,
    NOTIFICATION_ID,
};
use crate::schema::Schema;

/// Interval between timeout sweeps.
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Process-wide correlation id counter, shared by every peer instance.
/// Wraps modulo 2^32; only uniqueness among concurrently outstanding
/// requests matters, so relaxed ordering is enough.
static NEXT_CORRELATION_ID: AtomicU32 = AtomicU32::new(1);

fn next_correlation_id() -> u32 {
    NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Peer configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// How long a request may stay pending before it fails with
    /// [`ErrorCode::RequestTimeout`].
    pub request_timeout: Duration,
    /// Initial capacity of the reusable serialization buffer.
    pub builder_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            builder_capacity: DEFAULT_BUILDER_CAPACITY,
        }
    }
}

/// Function the peer hands encoded frames to, together with the app-data of
/// the message that produced them.
pub type TransportSink<A> = Arc<dyn Fn(Bytes, &A) + Send + Sync>;

struct PendingState {
    table: PendingTable,
    /// Timeout checker task, present exactly while the table is non-empty.
    checker: Option<JoinHandle<()>>,
}

struct PeerInner<A> {
    schema: Schema,
    config: PeerConfig,
    dispatcher: Arc<Dispatcher<A>>,
    sink: Mutex<Option<TransportSink<A>>>,
    pending: Mutex<PendingState>,
    builder: Mutex<EncodeBuilder>,
}

/// A bidirectional RPC endpoint over an arbitrary transport.
///
/// `A` is the typed per-message app-data: outbound calls lend it to the
/// sink, inbound dispatch hands a clone to guards and handlers.
pub struct Peer<A = ()> {
    inner: Arc<PeerInner<A>>,
}

impl<A> Clone for Peer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Peer<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Create a peer with the default configuration.
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, PeerConfig::default())
    }

    /// Create a peer with an explicit configuration.
    pub fn with_config(schema: Schema, config: PeerConfig) -> Self {
        let builder = EncodeBuilder::with_capacity(config.builder_capacity);
        Self {
            inner: Arc::new(PeerInner {
                schema,
                config,
                dispatcher: Arc::new(Dispatcher::new()),
                sink: Mutex::new(None),
                pending: Mutex::new(PendingState {
                    table: PendingTable::new(),
                    checker: None,
                }),
                builder: Mutex::new(builder),
            }),
        }
    }

    /// Register the function encoded frames are handed to, replacing any
    /// existing sink.
    pub fn set_transport_sink<F>(&self, sink: F)
    where
        F: Fn(Bytes, &A) + Send + Sync + 'static,
    {
        *self.inner.sink.lock().unwrap() = Some(Arc::new(sink));
    }

    /// Install the handler for `method`, replacing any existing one, and
    /// return a handle for chaining guards onto it.
    ///
    /// The handler receives the decoded request and the app-data of the
    /// inbound message. Its result is serialized and sent back for methods
    /// that declare a response body; void methods answer with an empty body
    /// whatever the handler returns.
    ///
    /// # Panics
    ///
    /// Panics when `method` is not declared in the schema, or when the
    /// handler's request type differs from the one the schema declares.
    pub fn register_handler<Req, Res, F, Fut>(&self, method: u16, handler: F) -> HandlerHandle<Req, A>
    where
        Req: Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res>> + Send + 'static,
    {
        let descriptor = self
            .inner
            .schema
            .descriptor(method)
            .unwrap_or_else(|| panic!("method {method} is not declared in the schema"));
        assert_eq!(
            descriptor.request_type,
            std::any::TypeId::of::<Req>(),
            "handler request type does not match the schema for method {method}"
        );

        let handler: TypedHandler<F, Req, Res, Fut> =
            TypedHandler::new(handler, descriptor.responds());
        self.inner.dispatcher.register(
            method,
            HandlerEntry {
                decode_request: descriptor.decode_request,
                guards: Vec::new(),
                handler: Box::new(handler),
            },
        );
        HandlerHandle::new(Arc::clone(&self.inner.dispatcher), method)
    }

    /// Send a Request and await its completion.
    ///
    /// Resolves with `Some(response)` when the remote answers with a body,
    /// or `None` when the method is void-response or the answer carried an
    /// empty body. Fails on timeout, a matching Error Response, response
    /// decode failure, or teardown.
    pub async fn request<Req, Res>(&self, method: u16, value: &Req, app_data: &A) -> Result<Option<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        let Some(descriptor) = self.inner.schema.descriptor(method) else {
            return Err(RpcError::new(
                ErrorCode::MethodNotFound,
                format!("method {method} is not declared in the schema"),
            ));
        };
        if let Some(response_type) = descriptor.response_type {
            if response_type != std::any::TypeId::of::<Res>() {
                return Err(RpcError::new(
                    ErrorCode::InternalError,
                    format!("response type does not match the schema for method {method}"),
                ));
            }
        }

        let id = next_correlation_id();
        let frame = self.encode_with_builder(MsgType::Request, id, method, value)?;
        let rx = self.insert_waiter(id, method);
        self.emit(frame, app_data);

        let completion = rx.await.map_err(|_| {
            RpcError::new(ErrorCode::InternalError, "peer dropped before completion").with_id(id)
        })?;
        match completion? {
            None => Ok(None),
            Some(value) => match value.downcast::<Res>() {
                Ok(value) => Ok(Some(*value)),
                Err(_) => Err(
                    RpcError::new(ErrorCode::InternalError, "response value type mismatch")
                        .with_id(id),
                ),
            },
        }
    }

    /// Emit a Notification. Notifications carry correlation id 0, register
    /// no waiter, and have no completion.
    pub fn notify<Req>(&self, method: u16, value: &Req, app_data: &A) -> Result<()>
    where
        Req: Serialize + ?Sized,
    {
        let frame = self.encode_notification(method, value)?;
        self.emit(frame, app_data);
        Ok(())
    }

    /// Encode a Notification frame without sending it, for callers that
    /// batch frames over their own transport.
    pub fn encode_notification<Req>(&self, method: u16, value: &Req) -> Result<Bytes>
    where
        Req: Serialize + ?Sized,
    {
        if !self.inner.schema.contains(method) {
            return Err(RpcError::new(
                ErrorCode::MethodNotFound,
                format!("method {method} is not declared in the schema"),
            ));
        }
        self.encode_with_builder(MsgType::Notification, NOTIFICATION_ID, method, value)
    }

    /// Feed one complete inbound frame to the peer.
    ///
    /// Never fails. Undecodable frames produce a parse-error Error Response
    /// on the sink, stamped with the all-ones generic id. Requests and
    /// Notifications are dispatched (handler futures run on a spawned task;
    /// this call returns once dispatch is scheduled); Responses and Error
    /// Responses complete the waiter they correlate with, and are dropped
    /// silently when no waiter matches.
    pub fn from_transport(&self, bytes: &[u8], app_data: A) {
        let frame = match decode_frame(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(error = %err, "undecodable inbound frame");
                self.send_error(GENERIC_ID, ErrorCode::ParseError, &err.message, &app_data);
                return;
            }
        };

        match frame.msg_type() {
            MsgType::Request | MsgType::Notification => {
                self.dispatch_inbound(frame.header, frame.body, app_data)
            }
            MsgType::Response => self.complete_response(frame.id(), frame.body),
            MsgType::ErrorResponse => self.complete_error(frame.id(), frame.body),
        }
    }

    /// Tear the peer down.
    ///
    /// Rejects every pending waiter with an internal error carrying
    /// `reason`, clears the dispatcher and its guard chains, stops the
    /// timeout checker, and clears the transport sink. The peer is inert
    /// afterwards: nothing further is emitted.
    pub fn clean(&self, reason: &str) {
        let (waiters, checker) = {
            let mut pending = self.inner.pending.lock().unwrap();
            (pending.table.drain(), pending.checker.take())
        };
        if let Some(checker) = checker {
            checker.abort();
        }
        for (id, waiter) in waiters {
            let _ = waiter
                .tx
                .send(Err(RpcError::new(ErrorCode::InternalError, reason).with_id(id)));
        }
        self.inner.dispatcher.clear();
        *self.inner.sink.lock().unwrap() = None;
        tracing::debug!(reason, "peer torn down");
    }

    /// Number of requests currently awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().table.len()
    }

    fn encode_with_builder<T>(&self, msg_type: MsgType, id: u32, method: u16, value: &T) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        let mut builder = self.inner.builder.lock().unwrap();
        let body = builder.encode(value)?;
        Ok(Bytes::from(encode_frame(msg_type, id, method, body)))
    }

    /// Record a waiter; start the timeout checker when the table was empty.
    fn insert_waiter(&self, id: u32, method: u16) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.inner.pending.lock().unwrap();
        pending.table.insert(
            id,
            Waiter {
                method,
                tx,
                enqueued_at: Instant::now(),
            },
        );
        if pending.checker.is_none() {
            pending.checker = Some(tokio::spawn(run_timeout_checker(self.clone())));
        }
        rx
    }

    /// Remove a waiter; stop the timeout checker when the table empties.
    fn remove_waiter(&self, id: u32) -> Option<Waiter> {
        let (waiter, checker) = {
            let mut pending = self.inner.pending.lock().unwrap();
            let waiter = pending.table.remove(id);
            let checker = if pending.table.is_empty() {
                pending.checker.take()
            } else {
                None
            };
            (waiter, checker)
        };
        if let Some(checker) = checker {
            checker.abort();
        }
        waiter
    }

    fn emit(&self, frame: Bytes, app_data: &A) {
        let sink = self.inner.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => sink(frame, app_data),
            None => tracing::trace!("no transport sink; outbound frame dropped"),
        }
    }

    fn send_error(&self, id: u32, code: ErrorCode, message: &str, app_data: &A) {
        self.emit(
            Bytes::from(encode_error_frame(id, code.wire(), message)),
            app_data,
        );
    }

    fn send_response(&self, id: u32, method: u16, body: &[u8], app_data: &A) {
        self.emit(
            Bytes::from(encode_frame(MsgType::Response, id, method, body)),
            app_data,
        );
    }

    fn dispatch_inbound(&self, header: Header, body: &[u8], app_data: A) {
        let is_request = header.msg_type == MsgType::Request;
        match self
            .inner
            .dispatcher
            .dispatch(header.method, body, app_data.clone())
        {
            DispatchOutcome::NoHandler => {
                if is_request {
                    self.send_error(header.id, ErrorCode::MethodNotFound, "Method not found", &app_data);
                } else {
                    tracing::debug!(method = header.method, "notification for unknown method dropped");
                }
            }
            DispatchOutcome::DecodeFailed(err) => {
                if is_request {
                    self.send_error(header.id, ErrorCode::InvalidRequest, &err.message, &app_data);
                } else {
                    tracing::debug!(method = header.method, error = %err, "undecodable notification dropped");
                }
            }
            DispatchOutcome::GuardRejected(err) => {
                if is_request {
                    self.send_error(header.id, ErrorCode::GuardError, &err.message, &app_data);
                } else {
                    tracing::debug!(method = header.method, error = %err, "notification rejected by guard");
                }
            }
            DispatchOutcome::Invoked(fut) => {
                let peer = self.clone();
                let (id, method) = (header.id, header.method);
                tokio::spawn(async move {
                    let result = fut.await;
                    if !is_request {
                        // Notifications never produce output, success or not.
                        if let Err(err) = result {
                            tracing::debug!(method, error = %err, "notification handler failed");
                        }
                        return;
                    }
                    match result {
                        Ok(Some(body)) => peer.send_response(id, method, &body, &app_data),
                        Ok(None) => peer.send_response(id, method, &[], &app_data),
                        Err(err) => {
                            peer.send_error(id, ErrorCode::ApplicationError, &err.message, &app_data)
                        }
                    }
                });
            }
        }
    }

    fn complete_response(&self, id: u32, body: &[u8]) {
        let Some(waiter) = self.remove_waiter(id) else {
            tracing::debug!(id, "response for unknown correlation id dropped");
            return;
        };

        let completion = if body.is_empty() {
            Ok(None)
        } else {
            match self
                .inner
                .schema
                .descriptor(waiter.method)
                .and_then(|descriptor| descriptor.decode_response)
            {
                Some(decode) => decode(body).map(Some).map_err(|err| err.with_id(id)),
                None => Ok(None),
            }
        };
        let _ = waiter.tx.send(completion);
    }

    fn complete_error(&self, id: u32, body: &[u8]) {
        let Some(waiter) = self.remove_waiter(id) else {
            tracing::debug!(id, "error response for unknown correlation id dropped");
            return;
        };

        let error = match decode_error_body(body) {
            Ok((code, message)) => RpcError::new(ErrorCode::from_wire(code), message).with_id(id),
            Err(err) => err.with_id(id),
        };
        let _ = waiter.tx.send(Err(error));
    }
}

/// Periodic sweep failing expired waiters.
///
/// One task per peer, alive exactly while the pending table is non-empty:
/// started by the insertion that makes the table non-empty, aborted by the
/// completion that drains it, and exiting by itself when its own sweep
/// leaves the table empty.
async fn run_timeout_checker<A>(peer: Peer<A>)
where
    A: Clone + Send + Sync + 'static,
{
    let timeout = peer.inner.config.request_timeout;
    let mut ticker = time::interval_at(Instant::now() + CHECK_INTERVAL, CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let (expired, drained) = {
            let mut pending = peer.inner.pending.lock().unwrap();
            let expired = pending.table.sweep_expired(timeout, Instant::now());
            let drained = pending.table.is_empty();
            if drained {
                // the handle dropped here is this task's own; it is exiting
                pending.checker = None;
            }
            (expired, drained)
        };

        for (id, waiter) in expired {
            tracing::debug!(id, method = waiter.method, "request timed out");
            let _ = waiter
                .tx
                .send(Err(
                    RpcError::new(ErrorCode::RequestTimeout, "Request timed out").with_id(id)
                ));
        }

        if drained {
            break;
        }
    }
}
