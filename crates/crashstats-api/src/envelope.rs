//! Turning outcomes into HTTP responses
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use crashstats_core::GatewayError;
use serde_json::{json, Value};
use tracing::error;

pub const JSON: &str = "application/json";
pub const JSON_UTF8: &str = "application/json; charset=UTF-8";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";

/// [`GatewayError`] as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_body(status: StatusCode, content_type: &'static str, value: &Value) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => with_body(status, content_type, bytes),
        Err(err) => {
            error!(error = %err, "Failed to serialize response");
            with_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                JSON,
                r#"{"error":"Internal Server Error"}"#,
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            GatewayError::Validation(errors) => {
                json_body(StatusCode::BAD_REQUEST, JSON_UTF8, &json!({ "errors": errors }))
            }
            GatewayError::Forbidden(reason) => {
                json_body(StatusCode::FORBIDDEN, JSON, &json!({ "error": reason }))
            }
            GatewayError::NotFound(name) => json_body(
                StatusCode::NOT_FOUND,
                JSON,
                &json!({ "error": format!("No model called {name:?}") }),
            ),
            GatewayError::MethodNotAllowed { method, allowed } => {
                let mut response = json_body(
                    StatusCode::METHOD_NOT_ALLOWED,
                    JSON,
                    &json!({ "error": format!("Method {method} not allowed") }),
                );
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(allowed));
                response
            }
            GatewayError::RateLimited => too_many_requests(),
            GatewayError::Backend(message) => {
                error!(error = %message, "Backend failure");
                json_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    JSON,
                    &json!({ "error": "Internal Server Error" }),
                )
            }
        }
    }
}

pub fn too_many_requests() -> Response {
    with_body(StatusCode::TOO_MANY_REQUESTS, "text/plain", TOO_MANY_REQUESTS)
}

/// 200 with the payload verbatim; `null` stays `null`.
pub fn json_ok(value: &Value, cache_seconds: Option<u64>) -> Response {
    let mut response = json_body(StatusCode::OK, JSON_UTF8, value);
    if let Some(seconds) = cache_seconds.filter(|s| *s > 0) {
        if let Ok(value) = HeaderValue::from_str(&format!("private, max-age={seconds}")) {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
    }
    response
}

/// 200 octet-stream download
pub fn attachment(bytes: Vec<u8>, filename: &str) -> Response {
    let mut response = with_body(StatusCode::OK, OCTET_STREAM, bytes);
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
