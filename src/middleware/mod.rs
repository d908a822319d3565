//! Middleware layer.
//!
//! A middleware receives the request and a [`Next`] handle to the rest of the
//! chain, and returns the response. Layers run in registration order on the
//! way in and in reverse order on the way out:
//!
//! ```text
//! request ─▶ request_id ─▶ logging ─▶ metrics ─▶ auth ─▶ router ─▶ handler
//! response ◀──────────────────────────────────────────────────────────┘
//! ```
//!
//! Built-in layers:
//! - [`RequestIdLayer`]: correlation id, propagated or generated
//! - [`Logging`]: one structured `request_completed` event per request
//! - [`Metrics`]: feeds the shared [`Stats`](crate::Stats) aggregate
//! - [`TokenAuth`]: static bearer / legacy path token check
//! - [`RateLimit`]: per-client token bucket
//!
//! Write your own with [`from_fn`]:
//!
//! ```rust,no_run
//! use servkit::middleware::{from_fn, Next};
//! use servkit::{Request, Response, Router};
//!
//! async fn server_header(req: Request, next: Next) -> Response {
//!     let mut res = next.run(req).await;
//!     res.headers_mut().insert("server", "servkit".parse().unwrap());
//!     res
//! }
//!
//! let app = Router::new().layer(from_fn(server_header));
//! ```

pub mod auth;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod request_id;

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub use auth::TokenAuth;
pub use logging::Logging;
pub use metrics::Metrics;
pub use rate_limit::{RateLimit, RateLimiter};
pub use request_id::{RequestId, RequestIdLayer};

/// A request interceptor.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain after the current middleware.
#[derive(Clone)]
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    /// Passes the request on and resolves to the inner response.
    pub async fn run(self, req: Request) -> Response {
        self.inner.call(req).await
    }
}

/// Adapts an `async fn(Request, Next) -> impl IntoResponse` into a [`Middleware`].
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn(f)
}

/// Middleware returned by [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// One middleware bound to the handler it wraps.
struct Layered {
    middleware: Arc<dyn Middleware>,
    next: BoxedHandler,
}

impl ErasedHandler for Layered {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Next { inner: Arc::clone(&self.next) };
        self.middleware.handle(req, next)
    }
}

/// Wraps `endpoint` so that `layers[0]` is outermost.
pub(crate) fn chain(endpoint: BoxedHandler, layers: &[Arc<dyn Middleware>]) -> BoxedHandler {
    layers.iter().rev().fold(endpoint, |next, middleware| {
        Arc::new(Layered { middleware: Arc::clone(middleware), next })
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::Bytes;
    use http::Method;

    use crate::request::Request;

    pub fn get(path: &str) -> Request {
        request(Method::GET, path, &[])
    }

    pub fn request(method: Method, path: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder.body(Bytes::new()).unwrap();
        Request::from_http(req, Some("10.0.0.7:51234".parse().unwrap()))
    }
}
