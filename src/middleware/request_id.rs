//! Correlation ids.
//!
//! Every request leaves this layer with exactly one id: the inbound
//! `X-Request-ID` when the caller sent a non-empty one, otherwise 16 random
//! bytes hex-encoded. The id is stored in the request extensions, written back
//! onto the inbound headers, and mirrored onto the response.

use std::fmt;
use std::ops::Deref;

use http::HeaderValue;
use http::header::HeaderName;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Header carrying the correlation id in both directions.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// A request correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh id: 128 bits from the thread-local CSPRNG, as 32 lowercase hex chars.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for RequestId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Returns the request's correlation id, or `None` if no id was attached.
pub fn request_id(req: &Request) -> Option<&str> {
    req.request_id().map(RequestId::as_str)
}

/// Attaches a [`RequestId`] to every request and echoes it on the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    fn resolve(req: &Request) -> RequestId {
        if let Some(existing) = req.request_id() {
            return existing.clone();
        }
        match req.header(X_REQUEST_ID.as_str()) {
            Some(inbound) if !inbound.is_empty() => RequestId(inbound.to_owned()),
            _ => RequestId::generate(),
        }
    }
}

impl Middleware for RequestIdLayer {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let id = Self::resolve(&req);
        // Inbound ids were already valid header text; generated ones are hex.
        let value = HeaderValue::from_str(id.as_str()).ok();

        if let Some(value) = &value {
            req.headers_mut().insert(X_REQUEST_ID, value.clone());
        }
        req.extensions_mut().insert(id);

        Box::pin(async move {
            let mut res = next.run(req).await;
            if let Some(value) = value {
                res.headers_mut().insert(X_REQUEST_ID, value);
            }
            res
        })
    }
}
