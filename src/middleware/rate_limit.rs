//! Per-client rate limiting.
//!
//! Each client (keyed by peer IP) gets a token bucket holding up to `burst`
//! tokens, refilled continuously at `rate` tokens per second. A request spends
//! one token; with less than one token left it is rejected immediately with
//! `429 Too Many Requests`. Nothing ever waits.
//!
//! The registry is never pruned entry by entry. Instead a background sweep
//! drops *every* bucket once per interval (default one minute), which bounds
//! memory at the cost of forgetting exhausted clients early.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use http::StatusCode;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// How often the registry is cleared when no interval is given.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn take(&mut self, now: Instant, rate: f64, burst: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Registry {
    rate: f64,
    burst: f64,
    clients: Mutex<HashMap<String, Bucket>>,
}

impl Registry {
    fn clear(&self) -> usize {
        let mut clients = self.clients.lock();
        let dropped = clients.len();
        *clients = HashMap::new();
        dropped
    }
}

/// Keyed token-bucket limiter. Clones share the same registry.
#[derive(Clone)]
pub struct RateLimiter {
    registry: Arc<Registry>,
    stop: Option<Arc<watch::Sender<bool>>>,
}

impl RateLimiter {
    /// `rate` is in events per second; `burst` is the bucket capacity.
    ///
    /// No sweep runs until [`with_sweep`](Self::with_sweep) is called.
    pub fn new(rate: f64, burst: u32) -> Self {
        let registry = Registry {
            rate: rate.max(0.0),
            burst: f64::from(burst),
            clients: Mutex::new(HashMap::new()),
        };
        Self { registry: Arc::new(registry), stop: None }
    }

    /// Starts the background sweep, clearing the registry every `every`.
    ///
    /// The sweep ends on [`shutdown`](Self::shutdown) or once the last clone
    /// of this limiter is dropped. A zero interval, or a call outside a tokio
    /// runtime, leaves the limiter without a sweep and logs a warning.
    pub fn with_sweep(mut self, every: Duration) -> Self {
        if every.is_zero() {
            warn!("zero sweep interval, rate limiter registry will not be swept");
            return self;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, rate limiter registry will not be swept");
            return self;
        };
        if let Some(previous) = self.stop.take() {
            previous.send_replace(true);
        }

        let (stop, stopped) = watch::channel(false);
        handle.spawn(sweep_loop(Arc::downgrade(&self.registry), every, stopped));
        self.stop = Some(Arc::new(stop));
        self
    }

    /// Spends one token for `client`. Returns `false` when the bucket is empty.
    pub fn acquire(&self, client: &str) -> bool {
        self.acquire_at(client, Instant::now())
    }

    fn acquire_at(&self, client: &str, now: Instant) -> bool {
        let Registry { rate, burst, clients } = &*self.registry;
        let mut clients = clients.lock();
        match clients.get_mut(client) {
            Some(bucket) => bucket.take(now, *rate, *burst),
            None => {
                let mut bucket = Bucket { tokens: *burst, last_refill: now };
                let allowed = bucket.take(now, *rate, *burst);
                clients.insert(client.to_owned(), bucket);
                allowed
            }
        }
    }

    /// Forgets every client. Returns how many were tracked.
    pub fn sweep(&self) -> usize {
        self.registry.clear()
    }

    /// Stops the background sweep, if one is running.
    pub fn shutdown(&self) {
        if let Some(stop) = &self.stop {
            stop.send_replace(true);
        }
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.registry.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rate(&self) -> f64 { self.registry.rate }
    pub fn burst(&self) -> u32 { self.registry.burst as u32 }
}

async fn sweep_loop(registry: Weak<Registry>, every: Duration, mut stopped: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(registry) = registry.upgrade() else { break };
                let dropped = registry.clear();
                debug!(dropped, "rate limiter registry swept");
            }
            changed = stopped.changed() => {
                if changed.is_err() || *stopped.borrow() {
                    break;
                }
            }
        }
    }
    debug!("rate limiter sweep stopped");
}

/// Middleware rejecting clients whose bucket is empty.
#[derive(Clone)]
pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    /// A limiter allowing `rate` requests per second per client with bursts
    /// up to `burst`, swept every [`DEFAULT_SWEEP_INTERVAL`].
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::with_limiter(RateLimiter::new(rate, burst).with_sweep(DEFAULT_SWEEP_INTERVAL))
    }

    pub fn with_limiter(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl Middleware for RateLimit {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let client = req.remote_addr().ip().to_string();
        if self.limiter.acquire(&client) {
            return Box::pin(next.run(req));
        }

        debug!(%client, path = %req.path(), "rate limit exceeded");
        Box::pin(async { Response::error(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{chain, test_support};

    #[test]
    fn burst_is_allowed_then_rejected() {
        let limiter = RateLimiter::new(10.0, 5);
        let now = Instant::now();

        for i in 0..5 {
            assert!(limiter.acquire_at("a", now), "request {i} within burst");
        }
        assert!(!limiter.acquire_at("a", now));
    }

    #[test]
    fn tokens_refill_at_rate() {
        let limiter = RateLimiter::new(10.0, 2);
        let now = Instant::now();

        assert!(limiter.acquire_at("a", now));
        assert!(limiter.acquire_at("a", now));
        assert!(!limiter.acquire_at("a", now));

        // 1/R = 100ms buys one token, not two.
        let later = now + Duration::from_millis(101);
        assert!(limiter.acquire_at("a", later));
        assert!(!limiter.acquire_at("a", later));
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(100.0, 3);
        let now = Instant::now();
        assert!(limiter.acquire_at("a", now));

        let much_later = now + Duration::from_secs(3600);
        let allowed = (0..10).filter(|_| limiter.acquire_at("a", much_later)).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1.0, 1);
        let now = Instant::now();

        assert!(limiter.acquire_at("a", now));
        assert!(!limiter.acquire_at("a", now));
        assert!(limiter.acquire_at("b", now));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn zero_burst_rejects_everything() {
        let limiter = RateLimiter::new(1000.0, 0);
        assert!(!limiter.acquire("a"));
    }

    #[test]
    fn manual_sweep_frees_exhausted_client() {
        let limiter = RateLimiter::new(0.0, 1);
        assert!(limiter.acquire("a"));
        assert!(!limiter.acquire("a"));

        assert_eq!(limiter.sweep(), 1);
        assert!(limiter.is_empty());
        assert!(limiter.acquire("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_clears_registry() {
        let limiter = RateLimiter::new(0.001, 1).with_sweep(Duration::from_secs(60));
        assert!(limiter.acquire("a"));
        assert!(!limiter.acquire("a"));

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(limiter.is_empty());
        assert!(limiter.acquire("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_sweep() {
        let limiter = RateLimiter::new(0.001, 1).with_sweep(Duration::from_secs(60));
        assert!(limiter.acquire("a"));
        limiter.shutdown();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(limiter.len(), 1);
        assert!(!limiter.acquire("a"));
    }

    async fn settle_until_no_tasks() -> usize {
        let metrics = tokio::runtime::Handle::current().metrics();
        for _ in 0..16 {
            if metrics.num_alive_tasks() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        metrics.num_alive_tasks()
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_ends_when_last_clone_drops() {
        let limiter = RateLimiter::new(1.0, 1).with_sweep(Duration::from_secs(60));
        let clone = limiter.clone();
        assert_eq!(tokio::runtime::Handle::current().metrics().num_alive_tasks(), 1);

        let registry = Arc::downgrade(&limiter.registry);
        drop(limiter);
        tokio::task::yield_now().await;
        assert_eq!(tokio::runtime::Handle::current().metrics().num_alive_tasks(), 1);

        drop(clone);
        assert_eq!(settle_until_no_tasks().await, 0);
        assert!(registry.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_runs_no_sweep() {
        let limiter = RateLimiter::new(0.001, 1).with_sweep(Duration::ZERO);
        assert!(limiter.stop.is_none());
        assert!(limiter.acquire("a"));

        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(settle_until_no_tasks().await, 0);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn middleware_answers_429_with_json_body() {
        let endpoint = |_req: Request| async { "ok" };
        let limit = RateLimit::with_limiter(RateLimiter::new(0.0, 2));
        let handler = chain(endpoint.into_boxed_handler(), &[Arc::new(limit)]);

        for _ in 0..2 {
            let res = handler.call(test_support::get("/")).await;
            assert_eq!(res.status_code(), StatusCode::OK);
        }
        let res = handler.call(test_support::get("/")).await;
        assert_eq!(res.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.body(), br#"{"error":"Too Many Requests"}"#);
    }
}
