//! Uniform JSON response envelope.
//!
//! ```json
//! {"status":"success","data":{...},"meta":{...}}
//! {"status":"error","error":{"code":404,"message":"no such user"}}
//! ```

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::response::{IntoResponse, Json, Response};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Envelope<T = Value> {
    pub status: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self { status: Outcome::Success, data: Some(data), error: None, meta: None }
    }

    pub fn with_meta(mut self, meta: impl Serialize) -> Self {
        self.meta = serde_json::to_value(meta).ok();
        self
    }
}

impl Envelope<Value> {
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: Outcome::Error,
            data: None,
            error: Some(ErrorBody { code, message: message.into() }),
            meta: None,
        }
    }
}

/// Success envelopes answer `200`; error envelopes use their code as the HTTP
/// status when it is one, `500` otherwise.
impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = match &self.error {
            Some(err) => StatusCode::from_u16(err.code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            None => StatusCode::OK,
        };
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_omits_absent_fields() {
        let env = Envelope::success(json!({"id": 7})).with_meta(json!({"page": 1}));
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"status": "success", "data": {"id": 7}, "meta": {"page": 1}})
        );
    }

    #[test]
    fn error_envelope_sets_http_status() {
        let res = Envelope::error(404, "no such user").into_response();

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!({"status": "error", "error": {"code": 404, "message": "no such user"}}));
    }

    #[test]
    fn bogus_error_code_becomes_500() {
        let res = Envelope::error(42, "weird").into_response();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
