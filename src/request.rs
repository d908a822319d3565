//! Incoming HTTP request type.
//!
//! The body stays on the wire while the request travels through middleware,
//! so a layer that rejects (401, 429) answers without waiting for it. It is
//! read, up to [`MAX_BODY_BYTES`], just before the route handler runs.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body as _, Incoming};
use parking_lot::Mutex;
use tracing::debug;

use crate::middleware::request_id::RequestId;
use crate::response::Response;

/// Largest request body a handler will be given. Bigger bodies get `413`.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// An incoming HTTP request.
///
/// Request-scoped context (the correlation id, an authenticated principal,
/// anything a middleware wants to hand downstream) travels in
/// [`extensions`](Request::extensions), keyed by type.
pub struct Request {
    pub(crate) head: Parts,
    pub(crate) body: Bytes,
    // Mutex only so that Request stays Sync; Incoming is not.
    unread: Option<Mutex<Incoming>>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: SocketAddr,
}

impl Request {
    /// A request whose body has not been read yet.
    pub(crate) fn streaming(head: Parts, body: Incoming, remote_addr: SocketAddr) -> Self {
        Self {
            head,
            body: Bytes::new(),
            unread: Some(Mutex::new(body)),
            params: HashMap::new(),
            remote_addr,
        }
    }

    /// Builds a request from an [`http::Request`], e.g. to unit-test a handler
    /// without a server. Without a peer, the remote address is `0.0.0.0:0`.
    pub fn from_http(req: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let (head, body) = req.into_parts();
        let remote_addr = remote_addr.unwrap_or_else(|| (Ipv4Addr::UNSPECIFIED, 0).into());
        Self { head, body, unread: None, params: HashMap::new(), remote_addr }
    }

    /// Reads a body still on the wire into [`body`](Self::body).
    ///
    /// Fails with the response to send instead: `413` when the body is over
    /// `limit` (checked against `Content-Length` before reading anything),
    /// `400` when the client breaks off.
    pub(crate) async fn buffer_body(&mut self, limit: usize) -> Result<(), Response> {
        let Some(incoming) = self.unread.take().map(Mutex::into_inner) else {
            return Ok(());
        };
        if incoming.size_hint().lower() > limit as u64 {
            return Err(too_large());
        }

        match Limited::new(incoming, limit).collect().await {
            Ok(collected) => {
                self.body = collected.to_bytes();
                Ok(())
            }
            Err(e) if e.is::<LengthLimitError>() => Err(too_large()),
            Err(e) => {
                debug!(peer = %self.remote_addr, "failed to read request body: {e}");
                Err(Response::status(StatusCode::BAD_REQUEST))
            }
        }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.head.headers }
    /// The request body. Middleware sees it empty for requests coming off the
    /// network; route handlers see it in full.
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The correlation id attached by the request-id middleware, if any.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.head.extensions.get::<RequestId>()
    }
}

fn too_large() -> Response {
    Response::error(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = http::Request::builder()
            .uri("/things?x=1")
            .header("X-Custom", "yes")
            .body(Bytes::new())
            .unwrap();
        let req = Request::from_http(req, None);

        assert_eq!(req.header("x-custom"), Some("yes"));
        assert_eq!(req.header("x-missing"), None);
        assert_eq!(req.path(), "/things");
        assert_eq!(req.remote_addr().port(), 0);
        assert!(req.request_id().is_none());
    }

    #[tokio::test]
    async fn prebuilt_body_needs_no_buffering() {
        let req = http::Request::post("/items").body(Bytes::from_static(b"{}")).unwrap();
        let mut req = Request::from_http(req, None);

        assert!(req.buffer_body(1).await.is_ok());
        assert_eq!(req.body(), b"{}");
    }
}
