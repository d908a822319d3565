//! Request logging.
//!
//! Emits one `request_completed` event per request with method, path, status,
//! latency, peer address and correlation id. 5xx responses log at WARN, the
//! rest at INFO. Output format is whatever subscriber the process installed;
//! see [`telemetry::init`](crate::telemetry::init).

use std::time::Instant;

use tracing::{info, warn};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

#[derive(Clone, Copy, Debug, Default)]
pub struct Logging;

impl Middleware for Logging {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let ip = req.remote_addr();
        let request_id = req.request_id().map(|id| id.to_string()).unwrap_or_default();

        Box::pin(async move {
            let start = Instant::now();
            let res = next.run(req).await;
            let duration = start.elapsed();
            let status = res.status_code().as_u16();

            if status >= 500 {
                warn!(%method, %path, status, ?duration, %ip, %request_id, "request_completed");
            } else {
                info!(%method, %path, status, ?duration, %ip, %request_id, "request_completed");
            }
            res
        })
    }
}
