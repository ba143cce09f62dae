//! JSON error responses.
//!
//! # Responsibilities
//! - Wrap every error body in a `{"error": ...}` envelope
//! - Map internal failures to 500 without leaking detail to the client
//! - Provide the canned 404/405/429 responses used by the router and limiter

use std::any::Any;
use std::fmt::Display;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";
pub const NOT_FOUND_MESSAGE: &str = "the requested resource could not be found";
pub const RATE_LIMIT_MESSAGE: &str = "rate limit exceeded";

/// Send `message` in an error envelope with the given status.
pub fn error_response(status: StatusCode, message: impl Into<Value>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Log an unexpected failure and answer 500.
pub fn server_error(err: &dyn Display) -> Response {
    tracing::error!(error = %err, "Internal server error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
}

pub fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

pub fn method_not_allowed(method: &Method) -> Response {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("the {method} method is not supported for this resource"),
    )
}

pub fn rate_limit_exceeded() -> Response {
    error_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE)
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Response for a handler that panicked. The connection is closed
/// afterwards since its state is unknown.
pub fn handler_panicked(payload: Box<dyn Any + Send + 'static>) -> Response {
    let mut response = server_error(&format_args!("handler panicked: {}", panic_message(&*payload)));
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
