//! Outbound HTTP client.
//!
//! A pooled hyper client that carries the inbound correlation id onto every
//! call made on behalf of a request, so one id follows a request across
//! services:
//!
//! ```rust,no_run
//! use servkit::{Client, Request, Response};
//!
//! async fn proxy_user(req: Request) -> Response {
//!     let client = Client::new();
//!     match client.get("http://users.internal/users/1", req.request_id()).await {
//!         Ok(upstream) => Response::json(upstream.into_body()),
//!         Err(_) => Response::status(servkit::StatusCode::BAD_GATEWAY),
//!     }
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::Error;
use crate::middleware::request_id::{RequestId, X_REQUEST_ID};

/// Per-call deadline covering connect, send and body download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct Client {
    inner: HyperClient<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: HyperClient::builder(TokioExecutor::new()).build_http(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends `req`, setting `X-Request-ID` from `origin` when one is given.
    /// The response body is collected before returning.
    pub async fn send(
        &self,
        mut req: http::Request<Full<Bytes>>,
        origin: Option<&RequestId>,
    ) -> Result<http::Response<Bytes>, Error> {
        if let Some(value) = origin.and_then(|id| HeaderValue::from_str(id).ok()) {
            req.headers_mut().insert(X_REQUEST_ID, value);
        }
        debug!(method = %req.method(), uri = %req.uri(), request_id = ?origin.map(RequestId::as_str), "outbound request");

        let call = async {
            let res = self.inner.request(req).await?;
            let (head, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>(http::Response::from_parts(head, body))
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
    }

    pub async fn get(&self, url: &str, origin: Option<&RequestId>) -> Result<http::Response<Bytes>, Error> {
        let req = http::Request::builder()
            .method(Method::GET)
            .uri(url.parse::<Uri>()?)
            .body(Full::default())?;
        self.send(req, origin).await
    }

    pub async fn post(
        &self,
        url: &str,
        origin: Option<&RequestId>,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<http::Response<Bytes>, Error> {
        let req = http::Request::builder()
            .method(Method::POST)
            .uri(url.parse::<Uri>()?)
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(body.into()))?;
        self.send(req, origin).await
    }
}

impl Default for Client {
    fn default() -> Self { Self::new() }
}
