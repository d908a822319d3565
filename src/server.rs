//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** (or when the future passed to
//! [`Server::serve_with_shutdown`] resolves) the server:
//! 1. stops calling `listener.accept()`, so no new connections are made;
//! 2. lets every in-flight connection task run to completion;
//! 3. returns from `serve`, which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// How long a client may take to send request headers.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for one request, from the end of its headers to its response.
/// Covers reading the body and running the handler.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
    request_timeout: Duration,
}

impl Server {
    /// Binds a listener on `addr` (`host:port`).
    ///
    /// ```rust,no_run
    /// # async fn run() -> Result<(), servkit::Error> {
    /// let server = servkit::Server::bind("0.0.0.0:3000").await?;
    /// # Ok(()) }
    /// ```
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| Error::InvalidAddr { addr: addr.to_owned() })?;
        Ok(Self::from_listener(TcpListener::bind(addr).await?))
    }

    /// Serves on an already-bound listener (e.g. port `0` in tests).
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener, request_timeout: REQUEST_TIMEOUT }
    }

    /// Replaces [`REQUEST_TIMEOUT`]. A request still running at the deadline
    /// is answered with `503`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections and dispatches them through `router` until
    /// SIGTERM or Ctrl-C, then drains in-flight requests.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let addr = self.local_addr()?;
        let handler = router.into_handler();
        let deadline = self.request_timeout;

        let mut conn_builder = ConnBuilder::new(TokioExecutor::new());
        conn_builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(HEADER_READ_TIMEOUT);
        let conn_builder = Arc::new(conn_builder);

        info!(%addr, "listening");

        // Every spawned connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = self.listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = Arc::clone(&handler);
                    let conn_builder = Arc::clone(&conn_builder);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            dispatch(Arc::clone(&handler), req, remote_addr, deadline)
                        });

                        if let Err(e) = conn_builder.serve_connection(io, svc).await {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }
}

/// Turns one hyper request into one response.
///
/// The error type is [`Infallible`]: failures become responses (404 from the
/// router, 413 for an oversized body, 503 past the deadline, ...) so hyper
/// never sees an error. The body is handed over unread.
async fn dispatch(
    handler: BoxedHandler,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    deadline: Duration,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (head, body) = req.into_parts();
    let method = head.method.clone();
    let path = head.uri.path().to_owned();

    let call = handler.call(Request::streaming(head, body, remote_addr));
    let response = match tokio::time::timeout(deadline, call).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%method, %path, peer = %remote_addr, ?deadline, "request deadline exceeded");
            Response::error(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
        }
    };
    Ok(response.into_inner())
}

/// Resolves on the first SIGTERM or SIGINT. On non-Unix platforms only
/// Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
