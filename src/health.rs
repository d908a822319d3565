//! Built-in introspection endpoints.
//!
//! | Path | Body |
//! |---|---|
//! | `GET /health` | `{"status":"healthy","service":…,"version":…}` |
//! | `GET /version` | the version string, `text/plain` |
//! | `GET /metrics` | a [`StatsSnapshot`](crate::StatsSnapshot) as JSON |
//!
//! [`App`](crate::App) registers all three. They are plain handlers, so a
//! bare [`Router`](crate::Router) can mount them as well:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use servkit::{health, Config, Router, Stats};
//!
//! let config = Arc::new(Config::load("billing", "1.0.0"));
//! let stats = Arc::new(Stats::new());
//!
//! let app = Router::new()
//!     .get("/health",  health::health(Arc::clone(&config)))
//!     .get("/version", health::version(config))
//!     .get("/metrics", health::metrics(stats));
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::handler::Handler;
use crate::response::{IntoResponse, Json, Response};
use crate::stats::Stats;
use crate::Request;

#[derive(Serialize)]
struct HealthBody<'a> {
    status: &'static str,
    service: &'a str,
    version: &'a str,
}

/// Liveness: answers `200` with service name and version. If the process can
/// respond to HTTP at all it is healthy; there are no dependency checks.
pub fn health(config: Arc<Config>) -> impl Handler {
    move |_req: Request| {
        let config = Arc::clone(&config);
        async move {
            Json(HealthBody {
                status: "healthy",
                service: &config.app_name,
                version: &config.version,
            })
            .into_response()
        }
    }
}

/// The configured version as plain text.
pub fn version(config: Arc<Config>) -> impl Handler {
    move |_req: Request| {
        let version = config.version.clone();
        async move { Response::text(version) }
    }
}

/// A fresh snapshot of `stats`.
pub fn metrics(stats: Arc<Stats>) -> impl Handler {
    move |_req: Request| {
        let stats = Arc::clone(&stats);
        async move { Json(stats.snapshot()) }
    }
}
