//! Pre-handler guards.
//!
//! A guard is one of three callable shapes, kept as a flat list on the
//! handler entry and run in registration order before the handler. The
//! first failure aborts dispatch; for Requests the error goes back on the
//! wire as a guard error, for Notifications it is dropped.

use std::any::Any;

use crate::error::Result;

type BothFn<A> = Box<dyn Fn(&(dyn Any + Send), &A) -> Result<()> + Send + Sync>;
type RequestFn = Box<dyn Fn(&(dyn Any + Send)) -> Result<()> + Send + Sync>;
type AppDataFn<A> = Box<dyn Fn(&A) -> Result<()> + Send + Sync>;

/// A pre-handler check.
pub(crate) enum Guard<A> {
    /// Sees the decoded request and the app-data.
    WithBoth(BothFn<A>),
    /// Sees only the decoded request.
    RequestOnly(RequestFn),
    /// Sees only the app-data.
    AppDataOnly(AppDataFn<A>),
}

impl<A> Guard<A> {
    /// Invoke the guard with the arguments its variant expects.
    pub(crate) fn check(&self, request: &(dyn Any + Send), app_data: &A) -> Result<()> {
        match self {
            Guard::WithBoth(f) => f(request, app_data),
            Guard::RequestOnly(f) => f(request),
            Guard::AppDataOnly(f) => f(app_data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[test]
    fn test_each_variant_sees_its_arguments() {
        let request: Box<dyn Any + Send> = Box::new(41u32);

        let both: Guard<bool> = Guard::WithBoth(Box::new(|req, app| {
            let value = req.downcast_ref::<u32>().copied().unwrap_or(0);
            if *app && value == 41 {
                Ok(())
            } else {
                Err(RpcError::message("wrong arguments"))
            }
        }));
        assert!(both.check(request.as_ref(), &true).is_ok());
        assert!(both.check(request.as_ref(), &false).is_err());

        let request_only: Guard<bool> = Guard::RequestOnly(Box::new(|req| {
            match req.downcast_ref::<u32>() {
                Some(41) => Ok(()),
                _ => Err(RpcError::message("unexpected request")),
            }
        }));
        assert!(request_only.check(request.as_ref(), &false).is_ok());

        let app_only: Guard<bool> = Guard::AppDataOnly(Box::new(|app| {
            if *app {
                Ok(())
            } else {
                Err(RpcError::message("rejected"))
            }
        }));
        assert!(app_only.check(request.as_ref(), &true).is_ok());
        assert!(app_only.check(request.as_ref(), &false).is_err());
    }
}
