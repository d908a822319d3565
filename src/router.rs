//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Middleware registered with
//! [`Router::layer`] wraps the whole routing table, so unmatched requests (404)
//! still pass through request-id, logging and metrics.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::middleware::{self, Middleware};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
pub struct Router {
    routes: Routes,
    layers: Vec<Arc<dyn Middleware>>,
}

#[derive(Default)]
struct Routes {
    trees: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Routes::default(), layers: Vec::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use servkit::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for the same method. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .trees
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Adds a middleware layer. The first layer added sees the request first
    /// and the response last.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub(crate) fn push_layers_front(&mut self, front: Vec<Arc<dyn Middleware>>) {
        self.layers.splice(0..0, front);
    }

    /// Collapses routes and layers into one handler.
    pub(crate) fn into_handler(self) -> BoxedHandler {
        middleware::chain(Arc::new(self.routes), &self.layers)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Routes {
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    fn allows_other_method(&self, method: &Method, path: &str) -> bool {
        self.trees
            .iter()
            .any(|(m, tree)| m != method && tree.at(path).is_ok())
    }
}

impl ErasedHandler for Routes {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req)
            }
            None => {
                let status = if self.allows_other_method(req.method(), req.path()) {
                    StatusCode::METHOD_NOT_ALLOWED
                } else {
                    StatusCode::NOT_FOUND
                };
                Box::pin(async move { Response::status(status) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(method: Method, path: &str) -> Request {
        let req = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        Request::from_http(req, None)
    }

    async fn echo_id(req: Request) -> String {
        req.param("id").unwrap_or("none").to_owned()
    }

    #[tokio::test]
    async fn routes_by_method_and_extracts_params() {
        let handler = Router::new().get("/users/{id}", echo_id).into_handler();

        let res = handler.call(request(Method::GET, "/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"42");
    }

    #[tokio::test]
    async fn unknown_path_is_404_and_wrong_method_is_405() {
        let handler = Router::new().get("/users/{id}", echo_id).into_handler();

        let res = handler.call(request(Method::GET, "/nope")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let res = handler.call(request(Method::POST, "/users/1")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
