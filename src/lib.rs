//! # servkit
//!
//! The pieces every small HTTP service ends up rewriting, in one place:
//!
//! - **Server bootstrap**: [`App`] registers `/health`, `/version` and
//!   `/metrics` and installs request-id, logging and metrics middleware
//! - **Middleware**: composable layers around a radix-tree [`Router`]:
//!   correlation ids, structured request logs, request statistics, static
//!   token auth and per-client rate limiting ([`middleware`])
//! - **Statistics**: a shared [`Stats`] aggregate with status counts, a
//!   latency histogram and live process telemetry
//! - **Configuration**: `PORT` plus `service.yaml` metadata ([`Config`])
//! - **Outbound calls**: a [`Client`] that forwards the correlation id
//! - **Responses**: [`Response`], [`Json`] and the [`Envelope`] shape
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use servkit::{App, Config, Json, Request};
//!
//! #[tokio::main]
//! async fn main() {
//!     servkit::telemetry::init();
//!
//!     App::new(Config::load("users", "0.3.1"))
//!         .get("/users/{id}", get_user)
//!         .start()
//!         .await;
//! }
//!
//! async fn get_user(req: Request) -> Json<serde_json::Value> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Json(serde_json::json!({ "id": id }))
//! }
//! ```

mod app;
mod client;
mod config;
mod envelope;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod stats;

pub mod health;
pub mod middleware;
pub mod telemetry;

pub use app::App;
pub use client::Client;
pub use config::{Config, ServiceMetadata};
pub use envelope::{Envelope, ErrorBody, Outcome};
pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler};
pub use http::{Method, StatusCode};
pub use middleware::request_id::{RequestId, request_id};
pub use request::{MAX_BODY_BYTES, Request};
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::Router;
pub use server::{HEADER_READ_TIMEOUT, REQUEST_TIMEOUT, Server};
pub use stats::{LatencyBuckets, LatencySnapshot, MAX_TRACKED_PATHS, Stats, StatsSnapshot, SystemSnapshot};
