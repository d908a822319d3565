//! A small service on top of servkit: built-in endpoints, token auth, rate
//! limiting, a custom middleware and an outbound call that keeps the
//! correlation id.
//!
//! Run with:
//!   PORT=3000 LOG_FORMAT=pretty cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/health
//!   curl -i http://localhost:3000/metrics
//!   curl -i -H 'authorization: Bearer demo-token' http://localhost:3000/users/42
//!   curl -i http://localhost:3000/t/demo-token/users/42
//!   curl -i -H 'x-request-id: abc123' http://localhost:3000/version

use servkit::middleware::{Next, RateLimit, TokenAuth, from_fn};
use servkit::{App, Client, Config, Envelope, IntoResponse, Json, Request, Response, StatusCode};

#[tokio::main]
async fn main() {
    servkit::telemetry::init();

    App::new(Config::load("demo", "0.1.0"))
        .with_middleware(from_fn(powered_by))
        .with_middleware(TokenAuth::new(["demo-token"]))
        .with_middleware(RateLimit::new(5.0, 10))
        .get("/users/{id}", get_user)
        .get("/t/{token}/users/{id}", get_user)
        .post("/users", create_user)
        .get("/upstream", upstream)
        .start()
        .await;
}

async fn powered_by(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    res.headers_mut().insert("x-powered-by", "servkit".parse().unwrap());
    res
}

// GET /users/{id}
async fn get_user(req: Request) -> Envelope {
    let id = req.param("id").unwrap_or("unknown");
    Envelope::success(serde_json::json!({ "id": id, "name": "alice" }))
}

// POST /users
async fn create_user(req: Request) -> Response {
    let Ok(input) = serde_json::from_slice::<serde_json::Value>(req.body()) else {
        return Envelope::error(400, "body must be JSON").into_response();
    };
    (StatusCode::CREATED, Json(Envelope::success(input))).into_response()
}

// GET /upstream: calls our own /version, forwarding the request id.
async fn upstream(req: Request) -> Response {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
    let url = format!("http://127.0.0.1:{port}/version");

    match Client::new().get(&url, req.request_id()).await {
        Ok(res) => Response::text(String::from_utf8_lossy(res.body()).into_owned()),
        Err(e) => Envelope::error(502, e.to_string()).into_response(),
    }
}
