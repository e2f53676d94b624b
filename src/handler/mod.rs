//! Handler module: dispatch table, erased handlers, and guards.
//!
//! Provides:
//! - the dispatcher mapping method ids to handler entries
//! - typed-to-erased handler wrapping
//! - the guard chain and the chaining registration handle

mod guard;
mod registry;

pub use registry::{BoxFuture, HandlerHandle};

pub(crate) use registry::{DispatchOutcome, Dispatcher, HandlerEntry, TypedHandler};
