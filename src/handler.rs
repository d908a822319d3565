//! Endpoint handlers.
//!
//! Route handlers, the routing table and every middleware layer all sit
//! behind one object-safe trait, [`ErasedHandler`]. That is what lets the
//! router store handlers of unrelated types side by side, and what lets a
//! layer wrap "the rest of the chain" without naming it:
//!
//! ```text
//! RequestIdLayer ─▶ Logging ─▶ Metrics ─▶ Routes ─▶ Endpoint<get_user>
//!       each arrow is a BoxedHandler; each hop is one dynamic call
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::{MAX_BODY_BYTES, Request};
use crate::response::{IntoResponse, Response};

/// Boxed response future returned by handlers and middleware.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Anything that can answer a routed request: an `async fn(Request) -> R` or
/// an equivalent closure, where `R: IntoResponse`.
///
/// Sealed. Reach for [`Middleware`](crate::middleware::Middleware) when the
/// blanket impl is not enough.
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut, R> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(Endpoint(Arc::new(self)))
    }
}

/// A user function placed at the end of a chain. The request body is read
/// here, after every middleware has let the request through.
struct Endpoint<F>(Arc<F>);

impl<F, Fut, R> ErasedHandler for Endpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, mut req: Request) -> BoxFuture {
        let f = Arc::clone(&self.0);
        Box::pin(async move {
            if let Err(rejection) = req.buffer_body(MAX_BODY_BYTES).await {
                return rejection;
            }
            (*f)(req).await.into_response()
        })
    }
}
