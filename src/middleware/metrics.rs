//! Feeds every completed request into the shared [`Stats`] aggregate.

use std::sync::Arc;
use std::time::Instant;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::stats::Stats;

/// Records status, latency and path of each request.
///
/// The status is read off the response the inner chain returns, so rejections
/// produced further in (401, 429) and router 404s are counted too.
#[derive(Clone)]
pub struct Metrics {
    stats: Arc<Stats>,
}

impl Metrics {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self { stats }
    }
}

impl Middleware for Metrics {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let stats = Arc::clone(&self.stats);
        let path = req.path().to_owned();

        Box::pin(async move {
            let start = Instant::now();
            let res = next.run(req).await;
            stats.record(res.status_code().as_u16(), start.elapsed(), &path);
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{chain, test_support};

    #[tokio::test]
    async fn records_inner_status_and_path() {
        let stats = Arc::new(Stats::new());
        let endpoint = |req: Request| async move {
            if req.path() == "/missing" { StatusCode::NOT_FOUND } else { StatusCode::OK }
        };
        let handler = chain(
            endpoint.into_boxed_handler(),
            &[Arc::new(Metrics::new(Arc::clone(&stats)))],
        );

        handler.call(test_support::get("/ok")).await;
        handler.call(test_support::get("/ok")).await;
        handler.call(test_support::get("/missing")).await;

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.status_counts[&200], 2);
        assert_eq!(snap.status_counts[&404], 1);
        assert_eq!(snap.path_stats["/ok"], 2);
    }
}
