//! Service bootstrap.
//!
//! [`App`] wires the defaults every service wants: `/health`, `/version` and
//! `/metrics`, plus request-id → logging → metrics ahead of any middleware
//! the caller adds.
//!
//! ```rust,no_run
//! use servkit::middleware::{RateLimit, TokenAuth};
//! use servkit::{App, Config, Request};
//!
//! #[tokio::main]
//! async fn main() {
//!     servkit::telemetry::init();
//!
//!     App::new(Config::load("billing", "1.0.0"))
//!         .with_middleware(TokenAuth::new(["s3cret"]))
//!         .with_middleware(RateLimit::new(10.0, 20))
//!         .get("/invoices/{id}", invoice)
//!         .start()
//!         .await
//! }
//!
//! async fn invoice(req: Request) -> String {
//!     format!("invoice {}", req.param("id").unwrap_or("?"))
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use http::Method;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::handler::Handler;
use crate::health;
use crate::middleware::{Logging, Metrics, Middleware, RequestIdLayer};
use crate::router::Router;
use crate::server::Server;
use crate::stats::Stats;

pub struct App {
    config: Arc<Config>,
    stats: Arc<Stats>,
    router: Router,
}

impl App {
    /// A service with the built-in endpoints registered and a fresh [`Stats`].
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let stats = Arc::new(Stats::new());
        let router = Router::new()
            .get("/health", health::health(Arc::clone(&config)))
            .get("/version", health::version(Arc::clone(&config)))
            .get("/metrics", health::metrics(Arc::clone(&stats)));

        Self { config, stats, router }
    }

    /// Adds a layer inside the defaults. Layers added first run first.
    pub fn with_middleware(mut self, middleware: impl Middleware) -> Self {
        self.router = self.router.layer(middleware);
        self
    }

    pub fn route(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.router = self.router.on(method, path, handler);
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.route(Method::POST, path, handler)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The aggregate behind `/metrics`.
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// The finished router: defaults outermost, then caller layers, then routes.
    pub fn into_router(self) -> Router {
        let defaults: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(RequestIdLayer),
            Arc::new(Logging),
            Arc::new(Metrics::new(self.stats)),
        ];
        let mut router = self.router;
        router.push_layers_front(defaults);
        router
    }

    /// Binds `0.0.0.0:$PORT` and serves until SIGTERM / Ctrl-C.
    pub async fn run(self) -> Result<(), Error> {
        let server = Server::bind(&self.config.listen_addr()).await?;
        self.log_start(&server)?;
        server.serve(self.into_router()).await
    }

    /// Serves on `listener` until `signal` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let server = Server::from_listener(listener);
        self.log_start(&server)?;
        server.serve_with_shutdown(self.into_router(), signal).await
    }

    /// [`run`](Self::run), treating any failure as fatal: it is logged and the
    /// process exits with status 1.
    pub async fn start(self) {
        if let Err(e) = self.run().await {
            error!(error = %e, "server failed");
            std::process::exit(1);
        }
    }

    fn log_start(&self, server: &Server) -> Result<(), Error> {
        info!(
            service = %self.config.app_name,
            version = %self.config.version,
            addr = %server.local_addr()?,
            "starting service"
        );
        Ok(())
    }
}
