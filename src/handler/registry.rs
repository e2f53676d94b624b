//! Handler dispatch: method id → entry of request constructor, guard chain,
//! and erased handler callable.
//!
//! Registration happens through typed entry points that erase the concrete
//! request/response types; dispatch looks the entry up by method id, decodes
//! the body, runs the guard chain, and invokes the handler. Everything up to
//! the handler future is synchronous.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::guard::Guard;
use crate::codec::MsgPackCodec;
use crate::error::{ErrorCode, Result, RpcError};
use crate::schema::{BoxedValue, DecodeFn};

/// Boxed future returned by erased handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Serialized response body; `None` for void methods.
pub(crate) type ResponseBody = Option<Vec<u8>>;

/// Object-safe handler callable.
pub(crate) trait ErasedHandler<A>: Send + Sync {
    /// Invoke the handler with a decoded request value.
    fn call(&self, request: BoxedValue, app_data: A) -> BoxFuture<Result<ResponseBody>>;
}

/// Wraps a typed handler closure.
///
/// Downcasts the erased request back to its concrete type, invokes the
/// closure, and serializes the result only when the method declares a
/// response body.
pub(crate) struct TypedHandler<F, Req, Res, Fut> {
    handler: F,
    responds: bool,
    _marker: PhantomData<fn(Req) -> (Res, Fut)>,
}

impl<F, Req, Res, Fut> TypedHandler<F, Req, Res, Fut> {
    pub(crate) fn new(handler: F, responds: bool) -> Self {
        Self {
            handler,
            responds,
            _marker: PhantomData,
        }
    }
}

impl<A, F, Req, Res, Fut> ErasedHandler<A> for TypedHandler<F, Req, Res, Fut>
where
    A: Send + 'static,
    F: Fn(Req, A) -> Fut + Send + Sync + 'static,
    Req: Send + 'static,
    Res: Serialize + Send + 'static,
    Fut: Future<Output = Result<Res>> + Send + 'static,
{
    fn call(&self, request: BoxedValue, app_data: A) -> BoxFuture<Result<ResponseBody>> {
        let request = match request.downcast::<Req>() {
            Ok(request) => request,
            Err(_) => {
                return Box::pin(async { Err(type_mismatch()) });
            }
        };
        let responds = self.responds;
        let fut = (self.handler)(*request, app_data);
        Box::pin(async move {
            let value = fut.await?;
            if responds {
                Ok(Some(MsgPackCodec::encode(&value)?))
            } else {
                Ok(None)
            }
        })
    }
}

fn type_mismatch() -> RpcError {
    RpcError::new(ErrorCode::InternalError, "request value type mismatch")
}

/// One registered method: its request constructor, guard chain, and
/// handler callable.
pub(crate) struct HandlerEntry<A> {
    pub(crate) decode_request: DecodeFn,
    pub(crate) guards: Vec<Guard<A>>,
    pub(crate) handler: Box<dyn ErasedHandler<A>>,
}

/// Outcome of a synchronous dispatch attempt.
pub(crate) enum DispatchOutcome {
    /// No handler registered for the method id.
    NoHandler,
    /// The request body failed to decode.
    DecodeFailed(RpcError),
    /// A guard rejected the request.
    GuardRejected(RpcError),
    /// Handler invoked; the future yields the serialized response body.
    Invoked(BoxFuture<Result<ResponseBody>>),
}

/// Method id → handler entry. Registration overwrites; dispatch reads.
pub(crate) struct Dispatcher<A> {
    entries: RwLock<HashMap<u16, HandlerEntry<A>>>,
}

impl<A> Dispatcher<A> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, method: u16, entry: HandlerEntry<A>) {
        self.entries.write().unwrap().insert(method, entry);
    }

    /// Append a guard to a method's chain. Returns `false` when no entry
    /// exists (for example after teardown), making the append a no-op.
    pub(crate) fn append_guard(&self, method: u16, guard: Guard<A>) -> bool {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(&method) {
            Some(entry) => {
                entry.guards.push(guard);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Look the entry up, decode the body, and run the guard chain; on
    /// success invoke the handler and hand back its future.
    pub(crate) fn dispatch(&self, method: u16, body: &[u8], app_data: A) -> DispatchOutcome {
        let entries = self.entries.read().unwrap();
        let Some(entry) = entries.get(&method) else {
            return DispatchOutcome::NoHandler;
        };

        let request = match (entry.decode_request)(body) {
            Ok(request) => request,
            Err(err) => return DispatchOutcome::DecodeFailed(err),
        };

        for guard in &entry.guards {
            if let Err(err) = guard.check(request.as_ref(), &app_data) {
                return DispatchOutcome::GuardRejected(err);
            }
        }

        DispatchOutcome::Invoked(entry.handler.call(request, app_data))
    }
}

/// Handle returned from handler registration, used to chain guards onto the
/// handler's entry.
///
/// Each append returns the handle again, so guards chain fluently. The
/// handle does not outlive its entry: after teardown the entry is gone and
/// appends become no-ops.
pub struct HandlerHandle<Req, A> {
    dispatcher: Arc<Dispatcher<A>>,
    method: u16,
    _marker: PhantomData<fn(Req)>,
}

impl<Req, A> HandlerHandle<Req, A>
where
    Req: Send + 'static,
    A: 'static,
{
    pub(crate) fn new(dispatcher: Arc<Dispatcher<A>>, method: u16) -> Self {
        Self {
            dispatcher,
            method,
            _marker: PhantomData,
        }
    }

    /// Append a guard that sees the decoded request and the app-data.
    pub fn add_guard<F>(self, guard: F) -> Self
    where
        F: Fn(&Req, &A) -> Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.append_guard(
            self.method,
            Guard::WithBoth(Box::new(move |request, app_data| {
                match request.downcast_ref::<Req>() {
                    Some(request) => guard(request, app_data),
                    None => Err(type_mismatch()),
                }
            })),
        );
        self
    }

    /// Append a guard that sees only the decoded request.
    pub fn add_request_guard<F>(self, guard: F) -> Self
    where
        F: Fn(&Req) -> Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.append_guard(
            self.method,
            Guard::RequestOnly(Box::new(move |request| {
                match request.downcast_ref::<Req>() {
                    Some(request) => guard(request),
                    None => Err(type_mismatch()),
                }
            })),
        );
        self
    }

    /// Append a guard that sees only the app-data.
    pub fn add_app_data_guard<F>(self, guard: F) -> Self
    where
        F: Fn(&A) -> Result<()> + Send + Sync + 'static,
    {
        self.dispatcher
            .append_guard(self.method, Guard::AppDataOnly(Box::new(guard)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sum {
        a: i32,
        b: i32,
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct SumResult {
        total: i32,
    }

    fn decode_sum(body: &[u8]) -> Result<BoxedValue> {
        Ok(Box::new(MsgPackCodec::decode::<Sum>(body)?))
    }

    fn sum_entry(responds: bool) -> HandlerEntry<u32> {
        let handler = TypedHandler::new(
            |req: Sum, _app: u32| async move {
                Ok(SumResult {
                    total: req.a + req.b,
                })
            },
            responds,
        );
        HandlerEntry {
            decode_request: decode_sum,
            guards: Vec::new(),
            handler: Box::new(handler),
        }
    }

    fn encoded_sum(a: i32, b: i32) -> Vec<u8> {
        MsgPackCodec::encode(&Sum { a, b }).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_invokes_handler() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.register(1, sum_entry(true));

        let DispatchOutcome::Invoked(fut) = dispatcher.dispatch(1, &encoded_sum(10, 32), 0) else {
            panic!("expected handler invocation");
        };
        let body = fut.await.unwrap().expect("responding method");
        let result: SumResult = MsgPackCodec::decode(&body).unwrap();
        assert_eq!(result.total, 42);
    }

    #[tokio::test]
    async fn test_void_handler_yields_no_body() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.register(1, sum_entry(false));

        let DispatchOutcome::Invoked(fut) = dispatcher.dispatch(1, &encoded_sum(1, 2), 0) else {
            panic!("expected handler invocation");
        };
        assert!(fut.await.unwrap().is_none());
    }

    #[test]
    fn test_dispatch_unknown_method() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        assert!(matches!(
            dispatcher.dispatch(9, &[], 0),
            DispatchOutcome::NoHandler
        ));
    }

    #[test]
    fn test_dispatch_undecodable_body() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.register(1, sum_entry(true));

        assert!(matches!(
            dispatcher.dispatch(1, b"\xc1", 0),
            DispatchOutcome::DecodeFailed(_)
        ));
    }

    #[test]
    fn test_guards_run_in_order_and_abort() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dispatcher: Arc<Dispatcher<u32>> = Arc::new(Dispatcher::new());
        dispatcher.register(1, sum_entry(true));

        let seen = Arc::new(AtomicUsize::new(0));
        let first = seen.clone();
        let handle: HandlerHandle<Sum, u32> = HandlerHandle::new(dispatcher.clone(), 1);
        handle
            .add_request_guard(move |_req| {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .add_app_data_guard(|_app| Err(RpcError::message("rejected")))
            .add_guard(|_req, _app| panic!("guard after a rejection must not run"));

        let outcome = dispatcher.dispatch(1, &encoded_sum(1, 2), 0);
        assert!(matches!(outcome, DispatchOutcome::GuardRejected(_)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_append_guard_without_entry_is_noop() {
        let dispatcher: Arc<Dispatcher<u32>> = Arc::new(Dispatcher::new());
        let handle: HandlerHandle<Sum, u32> = HandlerHandle::new(dispatcher.clone(), 5);

        // No entry for method 5; the append must not fail.
        let _handle = handle.add_request_guard(|_req| Ok(()));
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_registering_twice_overwrites() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.register(1, sum_entry(true));
        dispatcher.register(1, sum_entry(false));

        let DispatchOutcome::Invoked(fut) = dispatcher.dispatch(1, &encoded_sum(1, 2), 0) else {
            panic!("expected handler invocation");
        };
        assert!(fut.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let handler = TypedHandler::new(
            |_req: Sum, _app: u32| async move {
                Err::<SumResult, _>(RpcError::message("handler failed"))
            },
            true,
        );
        dispatcher.register(
            1,
            HandlerEntry {
                decode_request: decode_sum,
                guards: Vec::new(),
                handler: Box::new(handler),
            },
        );

        let DispatchOutcome::Invoked(fut) = dispatcher.dispatch(1, &encoded_sum(1, 2), 0) else {
            panic!("expected handler invocation");
        };
        let err = fut.await.unwrap_err();
        assert_eq!(err.message, "handler failed");
    }
}
