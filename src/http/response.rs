//! Response helpers.
//!
//! # Responsibilities
//! - Build the JSON envelope used by controllers and diagnostics
//! - Map dispatch errors to a structured error body
//!
//! # Envelope
//! ```text
//! success: {"code":200,"value":<payload>}
//! error:   {"code":500,"value":"<message>"}
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The JSON envelope body.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: u16,
    pub value: T,
}

/// `{"code":200,"value":<value>}` with status 200.
pub fn json<T: Serialize>(value: T) -> Response {
    envelope(StatusCode::OK, value)
}

/// `{"code":500,"value":"<message>"}` with status 500.
pub fn json_error(message: impl std::fmt::Display) -> Response {
    envelope(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

/// Envelope with an arbitrary code; the HTTP status mirrors it.
pub fn envelope<T: Serialize>(status: StatusCode, value: T) -> Response {
    let body = Envelope {
        code: status.as_u16(),
        value,
    };
    match serde_json::to_vec(&body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response envelope");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
