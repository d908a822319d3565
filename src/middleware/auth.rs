//! Static token authentication.
//!
//! A request passes when either an `Authorization: Bearer <token>` header or a
//! legacy `/t/<token>/...` path segment names a permitted token. `/health` and
//! `/version` always pass so probes keep working when the layer is global.

use std::collections::HashSet;
use std::sync::Arc;

use http::StatusCode;
use http::header::AUTHORIZATION;
use tracing::debug;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const EXEMPT_PATHS: [&str; 2] = ["/health", "/version"];

#[derive(Clone)]
pub struct TokenAuth {
    tokens: Arc<HashSet<String>>,
}

impl TokenAuth {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.is_empty())
            .collect();
        Self { tokens: Arc::new(tokens) }
    }

    fn permits(&self, req: &Request) -> bool {
        let valid = |token: Option<&str>| token.is_some_and(|t| self.tokens.contains(t));
        valid(bearer_token(req)) || valid(path_token(req.path()))
    }
}

impl Middleware for TokenAuth {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        if EXEMPT_PATHS.contains(&req.path()) || self.permits(&req) {
            return Box::pin(next.run(req));
        }

        debug!(path = %req.path(), ip = %req.remote_addr(), "rejecting unauthenticated request");
        Box::pin(async { Response::error(StatusCode::UNAUTHORIZED, "Unauthorized") })
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.header(AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The segment following the first `t` segment: `/t/abc/x` → `abc`.
fn path_token(path: &str) -> Option<&str> {
    let mut segments = path.split('/');
    segments.find(|s| *s == "t")?;
    segments.next().filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{chain, test_support};

    fn protected() -> crate::handler::BoxedHandler {
        let endpoint = |_req: Request| async { "secret" };
        chain(
            endpoint.into_boxed_handler(),
            &[Arc::new(TokenAuth::new(["good-token", "other"]))],
        )
    }

    #[test]
    fn extracts_legacy_path_token() {
        assert_eq!(path_token("/t/abc/resource"), Some("abc"));
        assert_eq!(path_token("/api/t/xyz"), Some("xyz"));
        assert_eq!(path_token("/t/"), None);
        assert_eq!(path_token("/t"), None);
        assert_eq!(path_token("/things/abc"), None);
    }

    #[tokio::test]
    async fn exempt_paths_need_no_token() {
        for path in ["/health", "/version"] {
            let res = protected().call(test_support::get(path)).await;
            assert_eq!(res.status_code(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn invalid_bearer_is_rejected_with_json_body() {
        let req = test_support::request(
            Method::GET,
            "/data",
            &[("Authorization", "Bearer wrong")],
        );
        let res = protected().call(req).await;

        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body(), br#"{"error":"Unauthorized"}"#);
    }

    #[tokio::test]
    async fn valid_bearer_passes() {
        let req = test_support::request(
            Method::GET,
            "/data",
            &[("Authorization", "Bearer good-token")],
        );
        let res = protected().call(req).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"secret");
    }

    #[tokio::test]
    async fn valid_legacy_path_token_passes() {
        let res = protected().call(test_support::get("/t/good-token/resource")).await;
        assert_eq!(res.status_code(), StatusCode::OK);

        let res = protected().call(test_support::get("/t/bad-token/resource")).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let res = protected().call(test_support::get("/data")).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    }
}
